use std::fmt;

/// Wraps credential material (API keys, webhook secrets) so it cannot leak through `Debug` formatting of the
/// config structs that carry it. The value only escapes through [`Secret::reveal`].
#[derive(Clone)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}
