//! Error types for gpu module serialization.

use derive_more::Display;
use weft_ir::Location;

pub type SerializeResult<T> = Result<T, SerializeError>;

#[derive(Clone, Display, Debug, PartialEq)]
#[display("{kind}")]
pub struct SerializeError {
    kind: Box<SerializeErrorKind>,
    /// The operation being serialized when the error occurred.
    location: Option<Location>,
}

impl<E> From<E> for SerializeError
where
    SerializeErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        SerializeError {
            kind: Box::new(SerializeErrorKind::from(error)),
            location: None,
        }
    }
}

impl SerializeError {
    pub fn kind(&self) -> &SerializeErrorKind {
        &self.kind
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Attach the location of the offending operation.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn translation(msg: impl std::fmt::Display) -> Self {
        SerializeErrorKind::Translation(msg.to_string()).into()
    }

    pub fn emission(msg: impl std::fmt::Display) -> Self {
        SerializeErrorKind::Emission(msg.to_string()).into()
    }

    pub fn temp_file(err: impl std::fmt::Display) -> Self {
        SerializeErrorKind::TempFile(err.to_string()).into()
    }
}

#[derive(Clone, Display, Debug, PartialEq)]
pub enum SerializeErrorKind {
    #[display("Invalid serialize to gpu blob optimization level {_0}")]
    InvalidOptLevel(i32),

    #[display("Could not translate module to LLVM IR: {_0}")]
    Translation(String),

    #[display("{_0}")]
    Optimization(String),

    #[display("Could not emit target assembly: {_0}")]
    Emission(String),

    #[display("Failed to create temp file: {_0}")]
    TempFile(String),

    #[display("Failed to run assembler: {_0}")]
    AssemblerSpawn(String),

    #[display("Failed to read assembler output: {_0}")]
    ReadOutput(String),

    #[display("Assembler produced no output")]
    EmptyOutput,
}

impl std::error::Error for SerializeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_converts_into_error() {
        let err: SerializeError = SerializeErrorKind::InvalidOptLevel(4).into();
        assert_eq!(err.kind(), &SerializeErrorKind::InvalidOptLevel(4));
        assert_eq!(
            err.to_string(),
            "Invalid serialize to gpu blob optimization level 4"
        );
        assert!(err.location().is_none());
    }

    #[test]
    fn optimization_message_is_verbatim() {
        let err: SerializeError =
            SerializeErrorKind::Optimization("Could not optimize LLVM IR: x\n".into()).into();
        assert_eq!(err.to_string(), "Could not optimize LLVM IR: x\n");
    }
}
