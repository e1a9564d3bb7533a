//! Validation of node names and addresses.

use thiserror::Error;

use crate::Address;

/// Maximum allowed length of a single name, in characters.
pub const MAX_NAME_LENGTH: usize = 512;

/// Maximum allowed address depth.
pub const MAX_ADDRESS_DEPTH: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("name is empty")]
    EmptyName,
    #[error("name is too long ({0} characters)")]
    NameTooLong(usize),
    #[error("name contains a control character")]
    ControlCharacter,
    #[error("address is too deep ({0} segments)")]
    AddressTooDeep(usize),
}

/// Validate a screen or control name.
///
/// Names must be non-empty, at most [`MAX_NAME_LENGTH`] characters, and
/// free of control characters (line breaks would corrupt the text tree).
///
/// ```
/// use canvas_address::validate_name;
///
/// validate_name("Label1").unwrap();
/// validate_name("").unwrap_err();
/// validate_name("a\nb").unwrap_err();
/// ```
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let count = name.chars().count();
    if count > MAX_NAME_LENGTH {
        return Err(ValidationError::NameTooLong(count));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::ControlCharacter);
    }
    Ok(())
}

/// Validate every segment of an address plus its depth.
pub fn validate_address(address: &Address) -> Result<(), ValidationError> {
    if address.depth() > MAX_ADDRESS_DEPTH {
        return Err(ValidationError::AddressTooDeep(address.depth()));
    }
    address
        .segments()
        .iter()
        .try_for_each(|segment| validate_name(segment))
}
