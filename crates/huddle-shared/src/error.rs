use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session token is malformed")]
    Malformed,

    #[error("Session token signature is invalid")]
    BadSignature,

    #[error("Session token has expired")]
    Expired,

    #[error("Session expiry is out of range")]
    ExpiryOutOfRange,
}

/// A status change that the entity's transition table does not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot move {entity} from '{from}' to '{to}'")]
pub struct TransitionError {
    pub entity: &'static str,
    pub from: &'static str,
    pub to: &'static str,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
