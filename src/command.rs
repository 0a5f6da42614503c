use std::str::FromStr;

use crate::key::{Key, RecordId};
use crate::parse::parse_command;

/// A line of input to the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Put(Key, RecordId),
    Get(Key),
    Delete(Key),
    Contains(Key),
    Count(Key),
    Size,
    Stats,
    Flush,
    Clear,
    Exit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_command(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        assert_eq!(
            "PUT ada #3:14".parse::<Command>().unwrap(),
            Command::Put(Key::from("ada"), RecordId::new(3, 14))
        );
        assert_eq!(
            "put 42 #0:7".parse::<Command>().unwrap(),
            Command::Put(Key::Int(42), RecordId::new(0, 7))
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!("SIZE".parse::<Command>().unwrap(), Command::Size);
        assert_eq!("stats".parse::<Command>().unwrap(), Command::Stats);
        assert_eq!("EXIT".parse::<Command>().unwrap(), Command::Exit);
        assert!("SIZE 1".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Command>().is_err());
        assert!("FETCH ada".parse::<Command>().is_err());
        assert!("PUT ada".parse::<Command>().is_err());
        assert!("PUT ada 12".parse::<Command>().is_err());
    }
}
