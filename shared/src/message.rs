//! Named messages with a fixed, versioned field layout.
//!
//! Bodies are encoded with bincode's default (fixed-width, little-endian)
//! layout in field declaration order, so every message type has a constant
//! wire size and decoding can reject any body of the wrong length up front.

use crate::error::DecodeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

pub trait NamedMessage: Serialize + DeserializeOwned + Send + 'static {
    /// Name the message is registered and sent under.
    const NAME: &'static str;
    /// Layout version, bumped whenever a field is added, removed or retyped.
    const VERSION: u8;
    /// Exact encoded size of the body in bytes.
    const WIRE_SIZE: usize;

    fn encode(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        if body.len() != Self::WIRE_SIZE {
            return Err(DecodeError::Length {
                name: Self::NAME.to_string(),
                expected: Self::WIRE_SIZE,
                actual: body.len(),
            });
        }

        bincode::deserialize(body).map_err(|e| DecodeError::Malformed {
            name: Self::NAME.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Example payload broadcast to every client: a flag, a counter and the
/// recipient's own connection id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestMsg {
    pub bool_value: bool,
    pub int_value: i32,
    pub ulong_value: u64,
}

impl NamedMessage for TestMsg {
    const NAME: &'static str = "TestMsg";
    const VERSION: u8 = 1;
    const WIRE_SIZE: usize = 1 + 4 + 8;
}

impl fmt::Display for TestMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TestMsg {{ bool_value: {}, int_value: {}, ulong_value: {} }}",
            self.bool_value, self.int_value, self.ulong_value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_layout_is_fixed() {
        let msg = TestMsg {
            bool_value: true,
            int_value: -2,
            ulong_value: 0x0102_0304_0506_0708,
        };

        let body = msg.encode().unwrap();

        assert_eq!(body.len(), TestMsg::WIRE_SIZE);
        assert_eq!(body[0], 1);
        assert_eq!(&body[1..5], &(-2i32).to_le_bytes());
        assert_eq!(&body[5..13], &0x0102_0304_0506_0708u64.to_le_bytes());
    }

    #[test]
    fn test_boundary_values_roundtrip() {
        let cases = [
            TestMsg {
                bool_value: false,
                int_value: i32::MIN,
                ulong_value: 0,
            },
            TestMsg {
                bool_value: true,
                int_value: i32::MAX,
                ulong_value: u64::MAX,
            },
        ];

        for msg in cases {
            let body = msg.encode().unwrap();
            assert_eq!(TestMsg::decode(&body).unwrap(), msg);
        }
    }

    #[test]
    fn test_short_body_is_length_error() {
        let body = TestMsg::default().encode().unwrap();

        match TestMsg::decode(&body[..body.len() - 1]) {
            Err(DecodeError::Length {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 13);
                assert_eq!(actual, 12);
            }
            other => panic!("expected length error, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut body = TestMsg::default().encode().unwrap();
        body.push(0);

        assert!(matches!(
            TestMsg::decode(&body),
            Err(DecodeError::Length { actual: 14, .. })
        ));
    }

    #[test]
    fn test_invalid_bool_is_malformed() {
        let mut body = TestMsg::default().encode().unwrap();
        body[0] = 7;

        assert!(matches!(
            TestMsg::decode(&body),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
