use std::{fmt, ops::Deref};

/// Size of the attribute buffers the kernel drivers fill, terminator included.
pub const MAX_SYSFS_STRING_SIZE: usize = 32;

/// Marker for fields the driver does not report in the current mode.
pub const NOT_AVAILABLE: &str = "N/A";

/// Short state or value string read from a sysfs attribute.
///
/// Holds at most `MAX_SYSFS_STRING_SIZE - 1` bytes; longer input is cut at the
/// last character boundary that fits.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct SysfsString(String);

impl SysfsString {
    pub const CAPACITY: usize = MAX_SYSFS_STRING_SIZE - 1;

    pub fn new(value: &str) -> Self {
        let mut end = value.len().min(Self::CAPACITY);
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        Self(value[..end].to_owned())
    }

    pub fn not_available() -> Self {
        Self(NOT_AVAILABLE.to_owned())
    }

    pub fn is_not_available(&self) -> bool {
        self.0 == NOT_AVAILABLE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn set(&mut self, value: &str) {
        *self = Self::new(value);
    }
}

impl Deref for SysfsString {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SysfsString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for SysfsString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SysfsString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for SysfsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SysfsString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}
