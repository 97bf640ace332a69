use std::fmt;
use std::str::FromStr;

/// Highest activation threshold the device accepts, although the wire
/// format carries a full byte.
pub const MAX_THRESHOLD: u8 = 127;

/// Field order of the threshold vector on the wire (`SEPV`/`GEPV`).
pub const THRESHOLD_FIELDS: [&str; 8] = [
    "Mic1", "Mic2", "Sounder1", "Sounder2", "Opto1", "Opto2", "Opto3", "Opto4",
];

/// Field order of the smoothing mask.
pub const SMOOTHING_FIELDS: [&str; 6] = ["Mic1", "Mic2", "Opto4", "Opto3", "Opto2", "Opto1"];

/// Appended to the 6 smoothing bits on the wire; those two lines are always on.
const SMOOTHING_WIRE_SUFFIX: &str = "11";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Invalid format: expected {expected} values, got {actual}")]
    FieldCount { expected: usize, actual: usize },

    #[error("Invalid value at position {position}: '{value}' is not a number between 0 and 255")]
    InvalidNumber { position: usize, value: String },

    #[error("Invalid value at position {position}: expected 0 or 1, got '{value}'")]
    NotBinary { position: usize, value: String },

    #[error("{field} threshold {value} out of range (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u8,
        max: u8,
    },
}

/// Activation thresholds of the eight adjustable lines: microphone
/// activation, sounder amplitude and opto luminance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub mic1: u8,
    pub mic2: u8,
    pub sounder1: u8,
    pub sounder2: u8,
    pub opto1: u8,
    pub opto2: u8,
    pub opto3: u8,
    pub opto4: u8,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mic1: 0,
            mic2: 0,
            sounder1: 63,
            sounder2: 63,
            opto1: 110,
            opto2: 110,
            opto3: 110,
            opto4: 110,
        }
    }
}

impl Thresholds {
    /// Every line set to `value`.
    pub const fn uniform(value: u8) -> Self {
        Self::from_array([value; 8])
    }

    pub const fn from_array(values: [u8; 8]) -> Self {
        Self {
            mic1: values[0],
            mic2: values[1],
            sounder1: values[2],
            sounder2: values[3],
            opto1: values[4],
            opto2: values[5],
            opto3: values[6],
            opto4: values[7],
        }
    }

    /// Values in wire order.
    pub const fn to_array(&self) -> [u8; 8] {
        [
            self.mic1,
            self.mic2,
            self.sounder1,
            self.sounder2,
            self.opto1,
            self.opto2,
            self.opto3,
            self.opto4,
        ]
    }

    pub fn mics(mut self, value: u8) -> Self {
        self.mic1 = value;
        self.mic2 = value;
        self
    }

    pub fn sounders(mut self, value: u8) -> Self {
        self.sounder1 = value;
        self.sounder2 = value;
        self
    }

    pub fn optos(mut self, value: u8) -> Self {
        self.opto1 = value;
        self.opto2 = value;
        self.opto3 = value;
        self.opto4 = value;
        self
    }

    /// Check every field against the device range 0-127.
    pub fn validate(&self) -> Result<(), FormatError> {
        for (field, value) in THRESHOLD_FIELDS.into_iter().zip(self.to_array()) {
            if value > MAX_THRESHOLD {
                return Err(FormatError::OutOfRange {
                    field,
                    value,
                    max: MAX_THRESHOLD,
                });
            }
        }
        Ok(())
    }

    /// Comma separated decimal values, e.g. `0,0,63,63,110,110,110,110`.
    pub fn encode(&self) -> String {
        self.to_array()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn decode(s: &str) -> Result<Self, FormatError> {
        let parts: Vec<&str> = s.split(',').collect();
        if parts.len() != THRESHOLD_FIELDS.len() {
            return Err(FormatError::FieldCount {
                expected: THRESHOLD_FIELDS.len(),
                actual: parts.len(),
            });
        }

        let mut values = [0u8; 8];
        for (position, (slot, part)) in values.iter_mut().zip(parts).enumerate() {
            let invalid = || FormatError::InvalidNumber {
                position,
                value: part.to_string(),
            };
            // Plain decimal digits only, no sign.
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }
        Ok(Self::from_array(values))
    }
}

impl fmt::Display for Thresholds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Thresholds {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

/// Debounce filter per line. With smoothing off the box reports every raw
/// transition (each refresh of a CRT, for instance); with smoothing on,
/// offsets come out about 20 ms late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingMask {
    pub mic1: bool,
    pub mic2: bool,
    pub opto4: bool,
    pub opto3: bool,
    pub opto2: bool,
    pub opto1: bool,
}

impl Default for SmoothingMask {
    fn default() -> Self {
        Self {
            mic1: true,
            mic2: true,
            opto4: false,
            opto3: false,
            opto2: false,
            opto1: false,
        }
    }
}

impl SmoothingMask {
    pub const fn all() -> Self {
        Self::from_array([true; 6])
    }

    pub const fn none() -> Self {
        Self::from_array([false; 6])
    }

    pub const fn from_array(bits: [bool; 6]) -> Self {
        Self {
            mic1: bits[0],
            mic2: bits[1],
            opto4: bits[2],
            opto3: bits[3],
            opto2: bits[4],
            opto1: bits[5],
        }
    }

    pub const fn to_array(&self) -> [bool; 6] {
        [
            self.mic1, self.mic2, self.opto4, self.opto3, self.opto2, self.opto1,
        ]
    }

    fn digits(&self) -> impl Iterator<Item = &'static str> {
        self.to_array()
            .into_iter()
            .map(|bit| if bit { "1" } else { "0" })
    }

    /// `;` separated bits, e.g. `1;1;0;0;0;0`.
    pub fn encode(&self) -> String {
        self.digits().collect::<Vec<_>>().join(";")
    }

    /// The 8 character payload sent after `SMOO`.
    pub fn wire_payload(&self) -> String {
        let mut payload: String = self.digits().collect();
        payload.push_str(SMOOTHING_WIRE_SUFFIX);
        payload
    }

    pub fn decode(s: &str) -> Result<Self, FormatError> {
        let parts: Vec<&str> = s.split(';').collect();
        if parts.len() != SMOOTHING_FIELDS.len() {
            return Err(FormatError::FieldCount {
                expected: SMOOTHING_FIELDS.len(),
                actual: parts.len(),
            });
        }

        let mut bits = [false; 6];
        for (position, (slot, part)) in bits.iter_mut().zip(parts).enumerate() {
            *slot = match part {
                "0" => false,
                "1" => true,
                other => {
                    return Err(FormatError::NotBinary {
                        position,
                        value: other.to_string(),
                    })
                }
            };
        }
        Ok(Self::from_array(bits))
    }
}

impl fmt::Display for SmoothingMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SmoothingMask {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_encode_in_wire_order() {
        let t = Thresholds::from_array([1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(t.encode(), "1,2,3,4,5,6,7,8");
        assert_eq!(t.sounder1, 3);
        assert_eq!(t.opto4, 8);
    }

    #[test]
    fn test_thresholds_round_trip() {
        for t in [
            Thresholds::default(),
            Thresholds::uniform(0),
            Thresholds::uniform(255),
            Thresholds::uniform(63).mics(0).optos(127),
        ] {
            assert_eq!(Thresholds::decode(&t.encode()), Ok(t));
            assert_eq!(t.to_string().parse::<Thresholds>(), Ok(t));
        }
    }

    #[test]
    fn test_thresholds_wrong_field_count() {
        assert_eq!(
            Thresholds::decode("1,2,3"),
            Err(FormatError::FieldCount {
                expected: 8,
                actual: 3
            })
        );
    }

    #[test]
    fn test_thresholds_names_offending_position() {
        assert_eq!(
            Thresholds::decode("1,2,3,4,x,6,7,8"),
            Err(FormatError::InvalidNumber {
                position: 4,
                value: "x".to_string()
            })
        );
        assert!(matches!(
            Thresholds::decode("1,2,3,4,5,6,7,256"),
            Err(FormatError::InvalidNumber { position: 7, .. })
        ));
        assert!(Thresholds::decode("1,2,3,4,5,6,7,-1").is_err());
    }

    #[test]
    fn test_thresholds_require_plain_digits() {
        assert_eq!(
            Thresholds::decode("+5,2,3,4,5,6,7,8"),
            Err(FormatError::InvalidNumber {
                position: 0,
                value: "+5".to_string()
            })
        );
        assert!(matches!(
            Thresholds::decode("1,2,,4,5,6,7,8"),
            Err(FormatError::InvalidNumber { position: 2, .. })
        ));
    }

    #[test]
    fn test_thresholds_validate_device_range() {
        assert!(Thresholds::default().validate().is_ok());
        assert!(Thresholds::uniform(127).validate().is_ok());
        assert_eq!(
            Thresholds::default().sounders(128).validate(),
            Err(FormatError::OutOfRange {
                field: "Sounder1",
                value: 128,
                max: 127
            })
        );
    }

    #[test]
    fn test_smoothing_encode_and_payload() {
        let mask = SmoothingMask::default();
        assert_eq!(mask.encode(), "1;1;0;0;0;0");
        assert_eq!(mask.wire_payload(), "11000011");
        assert_eq!(SmoothingMask::all().wire_payload(), "11111111");
        assert_eq!(SmoothingMask::none().wire_payload(), "00000011");
    }

    #[test]
    fn test_smoothing_field_order() {
        let mask = SmoothingMask {
            opto4: true,
            ..SmoothingMask::none()
        };
        assert_eq!(mask.encode(), "0;0;1;0;0;0");
    }

    #[test]
    fn test_smoothing_round_trip() {
        for bits in 0u8..64 {
            let mut array = [false; 6];
            for (i, slot) in array.iter_mut().enumerate() {
                *slot = bits & (1 << i) != 0;
            }
            let mask = SmoothingMask::from_array(array);
            assert_eq!(SmoothingMask::decode(&mask.encode()), Ok(mask));
        }
    }

    #[test]
    fn test_smoothing_rejects_non_binary() {
        assert_eq!(
            SmoothingMask::decode("2;1;0;1;0;0"),
            Err(FormatError::NotBinary {
                position: 0,
                value: "2".to_string()
            })
        );
        assert!(matches!(
            SmoothingMask::decode("1;1;0"),
            Err(FormatError::FieldCount { expected: 6, actual: 3 })
        ));
    }
}
