use std::fmt;

use uuid::Uuid;

// One unit of work. We never look inside it: the same text goes into the log lines and,
// as raw bytes, into the record payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Where the generator takes its identifiers from. Uniqueness is the source's job.
pub trait IdentifierSource: Send {
    fn next_identifier(&mut self) -> anyhow::Result<Identifier>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Uuids;

impl IdentifierSource for Uuids {
    fn next_identifier(&mut self) -> anyhow::Result<Identifier> {
        Ok(Identifier::new(Uuid::new_v4().to_string()))
    }
}
