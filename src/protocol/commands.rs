use std::fmt::{Display, Formatter};

/// Protocol command byte, frame 3 of every worker-direction message.
/// Values are wire constants shared with the broker.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Ready = 0x01,
    Request = 0x02,
    Reply = 0x03,
    Heartbeat = 0x04,
    Disconnect = 0x05,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(Command::Ready),
            0x02 => Some(Command::Request),
            0x03 => Some(Command::Reply),
            0x04 => Some(Command::Heartbeat),
            0x05 => Some(Command::Disconnect),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Command::Ready => "Ready",
            Command::Request => "Request",
            Command::Reply => "Reply",
            Command::Heartbeat => "Heartbeat",
            Command::Disconnect => "Disconnect",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_round_trip() {
        for command in [
            Command::Ready,
            Command::Request,
            Command::Reply,
            Command::Heartbeat,
            Command::Disconnect,
        ] {
            assert_eq!(Command::from_byte(command.as_byte()), Some(command));
        }
    }

    #[test]
    fn test_unknown_byte() {
        assert_eq!(Command::from_byte(0x00), None);
        assert_eq!(Command::from_byte(0x06), None);
    }
}
