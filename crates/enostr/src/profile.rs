use serde_json::{Map, Value};

/// Decoded content of a kind 0 metadata note. Unknown fields are kept;
/// malformed content yields an empty profile rather than an error.
#[derive(Debug, Clone, Default)]
pub struct ProfileState(Map<String, Value>);

impl ProfileState {
    pub fn new(value: Map<String, Value>) -> Self {
        Self(value)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    /// Like [`get_str`] but treats blank strings as missing.
    ///
    /// [`get_str`]: ProfileState::get_str
    fn non_empty(&self, name: &str) -> Option<&str> {
        self.get_str(name)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    #[inline]
    pub fn name(&self) -> Option<&str> {
        self.get_str("name")
    }

    /// `display_name`, falling back to the older `displayName` key.
    pub fn display_name(&self) -> Option<&str> {
        self.non_empty("display_name")
            .or_else(|| self.non_empty("displayName"))
    }

    #[inline]
    pub fn lud06(&self) -> Option<&str> {
        self.non_empty("lud06")
    }

    #[inline]
    pub fn lud16(&self) -> Option<&str> {
        self.non_empty("lud16")
    }

    /// The payment endpoint descriptor, preferring the `name@domain` form.
    pub fn payment_descriptor(&self) -> Option<&str> {
        self.lud16().or_else(|| self.lud06())
    }

    pub fn from_note_contents(contents: &str) -> Self {
        let json = serde_json::from_str(contents);
        let data = if let Ok(Value::Object(data)) = json {
            data
        } else {
            Map::new()
        };

        Self::new(data)
    }
}
