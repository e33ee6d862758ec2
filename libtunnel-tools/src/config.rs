use std::io;

use tracing::debug;

use crate::error::Error;

/// Key/value configuration, backed by a TOML document
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl Config {
    fn lookup(&self, k: &str) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k.as_ref())?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k.as_ref())?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type boolean by path
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        self.lookup(k.as_ref())?.as_bool()
    }

    /// Set an entry by path, creating intermediate tables as needed.
    ///
    /// Returns false if a non-table value is in the way.
    pub fn set<T: AsRef<str>, V: Into<toml::Value>>(&mut self, k: T, v: V) -> bool {
        let mut keys: Vec<&str> = k.as_ref().split('.').collect();
        let last = match keys.pop() {
            Some(last) => last,
            None => return false,
        };
        let mut item = &mut self.value;
        for key in keys {
            let table = match item.as_table_mut() {
                Some(table) => table,
                None => return false,
            };
            item = table
                .entry(key)
                .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
        }
        match item.as_table_mut() {
            Some(table) => {
                table.insert(last.to_owned(), v.into());
                true
            }
            None => false,
        }
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table: toml::Table = toml::from_str(&s).map_err(|e| Error::Config(e.to_string()))?;
        debug!("loaded configuration sections: {:?}", table.keys().collect::<Vec<_>>());
        match self.value.as_table_mut() {
            Some(current) => current.extend(table),
            None => self.value = toml::Value::Table(table),
        }
        Ok(())
    }
}
