use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::debug;

use super::{Configuration, KEY_DELIMITER, error::ConfigError};

/// Environment variables use a double underscore where keys use `:`.
const ENV_DELIMITER: &str = "__";

#[derive(Debug, Clone)]
enum ConfigurationSource {
    InMemory(Vec<(String, String)>),
    Toml { origin: String, text: String },
    TomlFile { path: PathBuf, optional: bool },
    Environment { prefix: Option<String> },
    EnvFile { path: PathBuf, optional: bool },
    Chained(Arc<Configuration>),
}

/// Ordered list of configuration sources. Nothing is read until
/// [`ConfigurationBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct ConfigurationBuilder {
    sources: Vec<ConfigurationSource>,
}

impl ConfigurationBuilder {
    /// A builder without sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds literal `(key, value)` pairs.
    pub fn add_in_memory<I, K, V>(&mut self, pairs: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.sources.push(ConfigurationSource::InMemory(pairs));
        self
    }

    /// Adds TOML text. Nested tables become `table:key` entries and array
    /// items `array:index` entries. `origin` only labels parse errors.
    pub fn add_toml_str(
        &mut self,
        origin: impl Into<String>,
        text: impl Into<String>,
    ) -> &mut Self {
        self.sources.push(ConfigurationSource::Toml {
            origin: origin.into(),
            text: text.into(),
        });
        self
    }

    /// Adds a TOML file, read on [`build`](Self::build). A missing file
    /// is skipped when `optional`, an error otherwise.
    pub fn add_toml_file(
        &mut self,
        path: impl Into<PathBuf>,
        optional: bool,
    ) -> &mut Self {
        self.sources.push(ConfigurationSource::TomlFile {
            path: path.into(),
            optional,
        });
        self
    }

    /// Adds process environment variables. With a prefix only matching
    /// variables are used and the prefix is stripped; `__` maps to `:`.
    pub fn add_environment_variables(
        &mut self,
        prefix: Option<&str>,
    ) -> &mut Self {
        self.sources.push(ConfigurationSource::Environment {
            prefix: prefix.map(str::to_string),
        });
        self
    }

    /// Adds the pairs of a `.env` file without touching the process
    /// environment.
    pub fn add_env_file(
        &mut self,
        path: impl Into<PathBuf>,
        optional: bool,
    ) -> &mut Self {
        self.sources.push(ConfigurationSource::EnvFile {
            path: path.into(),
            optional,
        });
        self
    }

    /// Layers an already built configuration, e.g. the host configuration
    /// underneath the app configuration.
    pub fn add_configuration(
        &mut self,
        configuration: Arc<Configuration>,
    ) -> &mut Self {
        self.sources.push(ConfigurationSource::Chained(configuration));
        self
    }

    /// Number of sources added so far.
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Reads every source in order and flattens them into one
    /// [`Configuration`]. The first failing source aborts the build.
    pub fn build(&self) -> Result<Configuration, ConfigError> {
        let mut configuration = Configuration::new();

        for source in &self.sources {
            for (key, value) in load_source(source)? {
                configuration.insert(key, value);
            }
        }

        debug!(
            sources = self.sources.len(),
            keys = configuration.len(),
            "configuration built"
        );
        Ok(configuration)
    }
}

fn load_source(
    source: &ConfigurationSource,
) -> Result<Vec<(String, String)>, ConfigError> {
    match source {
        ConfigurationSource::InMemory(pairs) => Ok(pairs.clone()),
        ConfigurationSource::Toml { origin, text } => parse_toml(origin, text),
        ConfigurationSource::TomlFile { path, optional } => {
            let Some(text) = read_optional(path, *optional)? else {
                return Ok(Vec::new());
            };
            parse_toml(&path.display().to_string(), &text)
        }
        ConfigurationSource::Environment { prefix } => {
            Ok(std::env::vars_os()
                .filter_map(|(name, value)| {
                    // Variables that are not valid UTF-8 cannot be config keys.
                    let name = name.into_string().ok()?;
                    let value = value.into_string().ok()?;
                    let name = match prefix {
                        Some(prefix) => name.strip_prefix(prefix)?.to_string(),
                        None => name,
                    };
                    Some((env_key(&name), value))
                })
                .collect())
        }
        ConfigurationSource::EnvFile { path, optional } => {
            load_env_file(path, *optional)
        }
        ConfigurationSource::Chained(configuration) => Ok(configuration
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()),
    }
}

fn read_optional(
    path: &Path,
    optional: bool,
) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        if optional {
            return Ok(None);
        }
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn parse_toml(
    origin: &str,
    text: &str,
) -> Result<Vec<(String, String)>, ConfigError> {
    let table: toml::Table =
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })?;

    let mut pairs = Vec::new();
    for (key, value) in &table {
        flatten_toml(key.clone(), value, &mut pairs);
    }
    Ok(pairs)
}

fn flatten_toml(key: String, value: &toml::Value, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (child, value) in table {
                flatten_toml(format!("{key}{KEY_DELIMITER}{child}"), value, out);
            }
        }
        toml::Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten_toml(format!("{key}{KEY_DELIMITER}{index}"), value, out);
            }
        }
        toml::Value::String(text) => out.push((key, text.clone())),
        other => out.push((key, other.to_string())),
    }
}

fn load_env_file(
    path: &Path,
    optional: bool,
) -> Result<Vec<(String, String)>, ConfigError> {
    if !path.exists() {
        if optional {
            return Ok(Vec::new());
        }
        return Err(ConfigError::MissingFile {
            path: path.to_path_buf(),
        });
    }

    let env_error = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    let mut pairs = Vec::new();
    for item in dotenvy::from_path_iter(path).map_err(env_error)? {
        let (name, value) = item.map_err(env_error)?;
        pairs.push((env_key(&name), value));
    }
    Ok(pairs)
}

fn env_key(name: &str) -> String {
    name.replace(ENV_DELIMITER, KEY_DELIMITER)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn later_sources_override_earlier_ones() {
        let mut builder = ConfigurationBuilder::new();
        builder
            .add_toml_str("defaults", "Greeting = \"hello\"\nOther = \"x\"")
            .add_in_memory([("greeting", "hi")]);

        let configuration = builder.build().unwrap();
        assert_eq!(configuration.get("Greeting"), Some("hi"));
        assert_eq!(configuration.get("Other"), Some("x"));
    }

    #[test]
    fn toml_tables_and_arrays_are_flattened() {
        let mut builder = ConfigurationBuilder::new();
        builder.add_toml_str(
            "inline",
            r#"
            Retries = 3
            Enabled = true

            [Comments]
            BaseUrl = "https://example.test/"
            Tags = ["a", "b"]
            "#,
        );

        let configuration = builder.build().unwrap();
        assert_eq!(configuration.get("Retries"), Some("3"));
        assert_eq!(configuration.get("Enabled"), Some("true"));
        assert_eq!(
            configuration.get("comments:baseurl"),
            Some("https://example.test/")
        );
        assert_eq!(configuration.get("Comments:Tags:1"), Some("b"));
    }

    #[test]
    fn invalid_toml_names_its_origin() {
        let mut builder = ConfigurationBuilder::new();
        builder.add_toml_str("broken.toml", "this is = = not toml");

        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Parse { ref origin, .. } if origin == "broken.toml"
        ));
    }

    #[test]
    fn missing_files_respect_optional_flag() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");

        let mut optional = ConfigurationBuilder::new();
        optional.add_toml_file(&missing, true);
        assert!(optional.build().unwrap().is_empty());

        let mut required = ConfigurationBuilder::new();
        required.add_toml_file(&missing, false);
        assert!(matches!(
            required.build().unwrap_err(),
            ConfigError::MissingFile { .. }
        ));
    }

    #[test]
    fn env_file_keys_use_double_underscore_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "Comments__BaseUrl=http://localhost:9000/").unwrap();
        writeln!(file, "SomeKey=value").unwrap();

        let mut builder = ConfigurationBuilder::new();
        builder.add_env_file(&path, false);

        let configuration = builder.build().unwrap();
        assert_eq!(
            configuration.get("Comments:BaseUrl"),
            Some("http://localhost:9000/")
        );
        assert_eq!(configuration.get("SomeKey"), Some("value"));
    }

    #[cfg(unix)]
    #[test]
    fn environment_source_skips_non_utf8_variables() {
        use std::{ffi::OsStr, os::unix::ffi::OsStrExt};

        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::set_var(
                "CQRS_SOURCES_TEST_OPAQUE",
                OsStr::from_bytes(b"\xff\xfe"),
            );
            std::env::set_var("CQRS_SOURCES_TEST_Plain", "readable");
        }

        let mut builder = ConfigurationBuilder::new();
        builder.add_environment_variables(Some("CQRS_SOURCES_TEST_"));
        let configuration = builder.build();

        unsafe {
            std::env::remove_var("CQRS_SOURCES_TEST_OPAQUE");
            std::env::remove_var("CQRS_SOURCES_TEST_Plain");
        }

        let configuration = configuration.unwrap();
        assert_eq!(configuration.get("Plain"), Some("readable"));
        assert!(!configuration.contains_key("OPAQUE"));
    }

    #[test]
    fn chained_configuration_is_a_base_layer() {
        let mut host = ConfigurationBuilder::new();
        host.add_in_memory([("Environment", "Testing"), ("Shared", "host")]);
        let host = Arc::new(host.build().unwrap());

        let mut app = ConfigurationBuilder::new();
        app.add_configuration(host).add_in_memory([("Shared", "app")]);

        let configuration = app.build().unwrap();
        assert_eq!(configuration.get("Environment"), Some("Testing"));
        assert_eq!(configuration.get("Shared"), Some("app"));
    }
}
