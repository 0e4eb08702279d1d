//! Tuning knobs struct parsing helper.

/// Composes a knobs struct from its default values, then overwrites given
/// fields by parsing from given TOML string if it's not `None`. Returns an
/// `Ok(config)` on success, and `Err(PlasmaError)` on parser failure or on
/// any field name not listed.
///
/// Example:
/// ```no_compile
/// let config = parsed_config!(config_str => ReplicaConfig; io_timeout_ms)?;
/// ```
#[macro_export]
macro_rules! parsed_config {
    ($config_str:expr => $config_type:ty; $($field:ident),+) => {{
        let config_str: Option<&str> = $config_str;

        // closure helper for easier error returning
        let compose_config = || -> Result<$config_type, $crate::PlasmaError> {
            let mut config: $config_type = Default::default();
            let Some(config_str) = config_str else {
                return Ok(config);
            };

            let mut table = config_str.parse::<toml::Table>()?;

            // traverse through all given field names
            $({
                // if field name found in table (and removed)
                if let Some(v) = table.remove(stringify!($field)) {
                    config.$field = v.try_into()?;
                }
            })+

            // leftover keys are not expected hence invalid
            if let Some(key) = table.keys().next() {
                return Err($crate::PlasmaError::msg(format!(
                    "invalid field name '{}' in config",
                    key
                )));
            }

            Ok(config)
        };

        compose_config()
    }};
}

#[cfg(test)]
mod config_tests {
    use crate::utils::PlasmaError;

    #[derive(Debug, PartialEq)]
    struct TestConfig {
        timeout_ms: u64,
        label: String,
        retries: u8,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            TestConfig {
                timeout_ms: 500,
                label: "plasma".into(),
                retries: 3,
            }
        }
    }

    #[test]
    fn parse_from_none() -> Result<(), PlasmaError> {
        let config =
            parsed_config!(None => TestConfig; timeout_ms, label, retries)?;
        assert_eq!(config, TestConfig::default());
        Ok(())
    }

    #[test]
    fn parse_from_partial() -> Result<(), PlasmaError> {
        let config_str = Some("label = 'ring'\nretries = 7");
        let config =
            parsed_config!(config_str => TestConfig; label, retries)?;
        let ref_config = TestConfig {
            timeout_ms: 500,
            label: "ring".into(),
            retries: 7,
        };
        assert_eq!(config, ref_config);
        Ok(())
    }

    #[test]
    fn parse_invalid_field() {
        let config_str = Some("xyz = 999");
        assert!(parsed_config!(config_str => TestConfig; timeout_ms).is_err());
    }

    #[test]
    fn parse_wrong_type() {
        let config_str = Some("retries = 'many'");
        assert!(parsed_config!(config_str => TestConfig; retries).is_err());
    }
}
