//! The verb set of the control-channel wire protocol (spec §6).

use std::fmt;

/// A request verb. `Verb::from_str` returning `None` is the `INVALID_COMMAND`
/// case: the caller responds `ERROR:INVALID_COMMAND` and closes the
/// connection (spec §7, "Protocol" errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    ClientRegister,
    SsRegister,
    Read,
    Write,
    Create,
    Delete,
    Info,
    AddAccess,
    RemAccess,
    Copy,
    Heartbeat,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::ClientRegister => "CLIENT_REGISTER",
            Verb::SsRegister => "SS_REGISTER",
            Verb::Read => "READ",
            Verb::Write => "WRITE",
            Verb::Create => "CREATE",
            Verb::Delete => "DELETE",
            Verb::Info => "INFO",
            Verb::AddAccess => "ADDACCESS",
            Verb::RemAccess => "REMACCESS",
            Verb::Copy => "COPY",
            Verb::Heartbeat => "HEARTBEAT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "CLIENT_REGISTER" => Verb::ClientRegister,
            "SS_REGISTER" => Verb::SsRegister,
            "READ" => Verb::Read,
            "WRITE" => Verb::Write,
            "CREATE" => Verb::Create,
            "DELETE" => Verb::Delete,
            "INFO" => Verb::Info,
            "ADDACCESS" => Verb::AddAccess,
            "REMACCESS" => Verb::RemAccess,
            "COPY" => Verb::Copy,
            "HEARTBEAT" => Verb::Heartbeat,
            // VIEW, STREAM, EXEC, UNDO, LIST are reserved (spec §9 Open
            // Questions) and deliberately left unrecognized.
            _ => return None,
        })
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_all_verbs() {
        for verb in [
            Verb::ClientRegister,
            Verb::SsRegister,
            Verb::Read,
            Verb::Write,
            Verb::Create,
            Verb::Delete,
            Verb::Info,
            Verb::AddAccess,
            Verb::RemAccess,
            Verb::Copy,
            Verb::Heartbeat,
        ] {
            assert_eq!(Verb::from_str(verb.as_str()), Some(verb));
        }
    }

    #[test]
    fn reserved_verbs_are_unrecognized() {
        for reserved in ["VIEW", "STREAM", "EXEC", "UNDO", "LIST"] {
            assert_eq!(Verb::from_str(reserved), None);
        }
    }
}
