use super::{InsertRequest, Phase};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("expected username:password")]
    MissingSeparator,
    #[error("empty username")]
    EmptyUsername,
}

/// One `username:password` line of a breach dump, kept as raw bytes
#[derive(Clone, PartialEq, Eq)]
pub struct BreachRecord {
    pub username: Vec<u8>,
    pub password: Vec<u8>,
}

impl std::fmt::Debug for BreachRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BreachRecord")
            .field("username", &String::from_utf8_lossy(&self.username))
            .finish_non_exhaustive()
    }
}

impl BreachRecord {
    /// Parse one line; blank lines and `#` comments yield `Ok(None)`
    ///
    /// The username ends at the first `:`, so passwords may contain colons.
    ///  Bytes are taken as-is, whatever the dump's encoding.
    pub fn parse_line(line: &[u8]) -> Result<Option<Self>, RecordError> {
        let mut line = line;
        while let [rest @ .., b'\r' | b'\n'] = line {
            line = rest;
        }
        if line.iter().all(u8::is_ascii_whitespace) || line.starts_with(b"#") {
            return Ok(None);
        }

        let separator = line
            .iter()
            .position(|b| *b == b':')
            .ok_or(RecordError::MissingSeparator)?;
        let (username, password) = (&line[..separator], &line[separator + 1..]);
        if username.is_empty() {
            return Err(RecordError::EmptyUsername);
        }

        Ok(Some(Self {
            username: username.to_vec(),
            password: password.to_vec(),
        }))
    }

    pub fn into_request(self, phase: Phase) -> InsertRequest {
        InsertRequest::new(self.username, self.password, phase)
    }
}
