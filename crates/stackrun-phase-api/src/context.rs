use serde::Serialize;

/// Ordered key/value state shared by every hook of a run.
///
/// Earlier hooks write settings that later hooks read. Keys keep the
/// position of their first insertion; overwriting a key changes only its
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallContext {
    entries: Vec<(String, String)>,
}

impl InstallContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or overwrite `key`, returning the previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Set `key` only if it is absent. Returns true if the value was stored.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.entries.push((key, value.into()));
        true
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply `KEY=VALUE` lines written by a hook.
    ///
    /// Blank lines and `#` comments are skipped. Lines that are not a valid
    /// assignment are returned so the caller can report them.
    pub fn merge_assignments(&mut self, text: &str) -> Vec<String> {
        let mut rejected = Vec::new();
        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match parse_assignment(line) {
                Some((key, value)) => {
                    self.set(key, value);
                }
                None => rejected.push(raw.to_string()),
            }
        }
        rejected
    }
}

/// Split `KEY=VALUE`; the key must look like a shell variable name.
#[must_use]
pub fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if !is_valid_key(key) {
        return None;
    }
    Some((key, value))
}

/// Context keys double as environment variable names for script hooks.
#[must_use]
pub fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl<K, V> FromIterator<(K, V)> for InstallContext
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut ctx = Self::new();
        for (key, value) in iter {
            ctx.set(key, value);
        }
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_overwrite_keeps_position() {
        let mut ctx = InstallContext::new();
        ctx.set("DATABASE_TYPE", "mysql");
        ctx.set("SERVICE_HOST", "10.0.0.5");
        assert_eq!(ctx.set("DATABASE_TYPE", "postgresql"), Some("mysql".to_string()));

        let keys: Vec<&str> = ctx.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["DATABASE_TYPE", "SERVICE_HOST"]);
        assert_eq!(ctx.get("DATABASE_TYPE"), Some("postgresql"));
    }

    #[test]
    fn test_set_default_does_not_clobber() {
        let mut ctx = InstallContext::new();
        assert!(ctx.set_default("ENABLED_SERVICES", "keystone"));
        assert!(!ctx.set_default("ENABLED_SERVICES", "nova"));
        assert_eq!(ctx.get("ENABLED_SERVICES"), Some("keystone"));
    }

    #[test]
    fn test_remove() {
        let mut ctx: InstallContext = [("A", "1"), ("B", "2")].into_iter().collect();
        assert_eq!(ctx.remove("A"), Some("1".to_string()));
        assert_eq!(ctx.remove("A"), None);
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn test_merge_assignments() {
        let mut ctx = InstallContext::new();
        ctx.set("RABBIT_HOST", "localhost");
        let rejected = ctx.merge_assignments(
            "# written by hooks/install\n\
             RABBIT_HOST=10.0.0.7\n\
             \n\
             DB_URL=mysql://root@127.0.0.1/keystone?charset=utf8\n\
             not an assignment\n\
             1BAD=value\n",
        );

        assert_eq!(ctx.get("RABBIT_HOST"), Some("10.0.0.7"));
        assert_eq!(
            ctx.get("DB_URL"),
            Some("mysql://root@127.0.0.1/keystone?charset=utf8")
        );
        assert_eq!(rejected, vec!["not an assignment", "1BAD=value"]);
    }

    #[test]
    fn test_key_validation() {
        assert!(is_valid_key("_PRIVATE"));
        assert!(is_valid_key("HOST_IP6"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("9LIVES"));
        assert!(!is_valid_key("WITH-DASH"));
    }

    proptest! {
        #[test]
        fn prop_first_insertion_order_is_preserved(
            keys in proptest::collection::vec("[A-Z][A-Z0-9_]{0,6}", 1..20)
        ) {
            let mut ctx = InstallContext::new();
            let mut expected: Vec<String> = Vec::new();
            for (index, key) in keys.iter().enumerate() {
                ctx.set(key.clone(), index.to_string());
                if !expected.contains(key) {
                    expected.push(key.clone());
                }
            }
            let actual: Vec<String> = ctx.iter().map(|(k, _)| k.to_string()).collect();
            prop_assert_eq!(actual, expected);
        }
    }
}
