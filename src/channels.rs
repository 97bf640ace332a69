//! The twenty digital lines a BBTK reports in every capture record.
//!
//! Lines are identified by [`Channel`], whose discriminant is the line's
//! position in a record. Names come from a static table and are what the
//! CSV exporters print.

pub const CHANNEL_COUNT: usize = 20;
pub const INPUT_COUNT: usize = 12;
pub const OUTPUT_COUNT: usize = CHANNEL_COUNT - INPUT_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Keypad4,
    Keypad3,
    Keypad2,
    Keypad1,
    Opto4,
    Opto3,
    Opto2,
    Opto1,
    TtlIn2,
    TtlIn1,
    Mic2,
    Mic1,
    ActClose4,
    ActClose3,
    ActClose2,
    ActClose1,
    TtlOut2,
    TtlOut1,
    Sounder2,
    Sounder1,
}

const NAMES: [&str; CHANNEL_COUNT] = [
    "Keypad4", "Keypad3", "Keypad2", "Keypad1", "Opto4", "Opto3", "Opto2", "Opto1", "TTLin2",
    "TTLin1", "Mic2", "Mic1", "ActClose4", "ActClose3", "ActClose2", "ActClose1", "TTLout2",
    "TTLout1", "Sounder2", "Sounder1",
];

impl Channel {
    /// All lines in record order.
    pub const ALL: [Self; CHANNEL_COUNT] = [
        Self::Keypad4,
        Self::Keypad3,
        Self::Keypad2,
        Self::Keypad1,
        Self::Opto4,
        Self::Opto3,
        Self::Opto2,
        Self::Opto1,
        Self::TtlIn2,
        Self::TtlIn1,
        Self::Mic2,
        Self::Mic1,
        Self::ActClose4,
        Self::ActClose3,
        Self::ActClose2,
        Self::ActClose1,
        Self::TtlOut2,
        Self::TtlOut1,
        Self::Sounder2,
        Self::Sounder1,
    ];

    /// Lines the box listens on. Only these are analysed for events.
    pub const INPUTS: [Self; INPUT_COUNT] = [
        Self::Keypad4,
        Self::Keypad3,
        Self::Keypad2,
        Self::Keypad1,
        Self::Opto4,
        Self::Opto3,
        Self::Opto2,
        Self::Opto1,
        Self::TtlIn2,
        Self::TtlIn1,
        Self::Mic2,
        Self::Mic1,
    ];

    /// Lines the box drives.
    pub const OUTPUTS: [Self; OUTPUT_COUNT] = [
        Self::ActClose4,
        Self::ActClose3,
        Self::ActClose2,
        Self::ActClose1,
        Self::TtlOut2,
        Self::TtlOut1,
        Self::Sounder2,
        Self::Sounder1,
    ];

    /// Position of the line's state character within a record.
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        NAMES[self.index()]
    }

    pub const fn is_input(self) -> bool {
        self.index() < INPUT_COUNT
    }

    pub fn from_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .position(|&n| n == name)
            .map(|i| Self::ALL[i])
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
