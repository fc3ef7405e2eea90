//! Domain parameter provider.
//!
//! Parameters are loaded once at startup and shared immutably by every cycle.

use std::sync::Arc;

use dhkx_crypto::{BigUint, DomainParameters};

use crate::{config::DhConfig, error::ConfigError};

/// Default prime modulus (849 bits).
pub const DEFAULT_MODULUS: &str = concat!(
    "32387538809657546107071055687394908499043865305277579101593576509283355641453448",
    "07150033057961040728754572345258544588226658050311871620937068496966107379908371",
    "31884151018435937601748661897151625255887408068726063554327781115553869463775372",
    "2244763834358971",
);

/// Default generator.
pub const DEFAULT_GENERATOR: u32 = 7;

/// Default private key size in bits.
pub const DEFAULT_KEY_SIZE: u32 = 256;

/// Where domain parameters come from.
#[derive(Debug, Clone, Copy)]
pub enum ParameterSource<'a> {
    /// Compiled-in defaults
    Defaults,
    /// Configuration document section
    Config(&'a DhConfig),
}

impl<'a> From<Option<&'a DhConfig>> for ParameterSource<'a> {
    fn from(config: Option<&'a DhConfig>) -> Self {
        config.map_or(Self::Defaults, Self::Config)
    }
}

/// Validates and builds [`DomainParameters`].
pub struct ParameterProvider;

impl ParameterProvider {
    /// Load parameters from `source`.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidNumber` if modulus or generator is not decimal
    /// - `ConfigError::InvalidKeySize` if the key size is not positive
    /// - `ConfigError::InvalidGenerator` unless `1 < generator < modulus`
    /// - `ConfigError::InvalidParameters` if the modulus is 3 or less
    pub fn load(source: ParameterSource<'_>) -> Result<Arc<DomainParameters>, ConfigError> {
        let (modulus, generator, key_size) = match source {
            ParameterSource::Defaults => (
                parse_decimal("modulus", DEFAULT_MODULUS)?,
                BigUint::from(DEFAULT_GENERATOR),
                DEFAULT_KEY_SIZE,
            ),
            ParameterSource::Config(config) => (
                parse_decimal("modulus", &config.modulus)?,
                parse_decimal("generator", &config.generator)?,
                u32::try_from(config.key_size)
                    .ok()
                    .filter(|&bits| bits > 0)
                    .ok_or(ConfigError::InvalidKeySize(config.key_size))?,
            ),
        };

        if generator <= BigUint::from(1u32) || generator >= modulus {
            return Err(ConfigError::InvalidGenerator(generator.to_string()));
        }

        let params = DomainParameters::new(modulus, generator, key_size)?;
        tracing::info!(
            modulus_bits = params.modulus().bits(),
            generator = %params.generator(),
            key_size_bits = params.key_size_bits(),
            "domain parameters loaded"
        );

        Ok(Arc::new(params))
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<BigUint, ConfigError> {
    let invalid = || ConfigError::InvalidNumber { field, value: value.to_string() };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    BigUint::parse_bytes(value.as_bytes(), 10).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn dh(modulus: &str, generator: &str, key_size: i64) -> DhConfig {
        DhConfig { modulus: modulus.into(), generator: generator.into(), key_size }
    }

    #[test]
    fn defaults_load() {
        let params = ParameterProvider::load(ParameterSource::Defaults).unwrap();

        assert_eq!(params.modulus().bits(), 849);
        assert_eq!(params.generator(), &BigUint::from(7u32));
        assert_eq!(params.key_size_bits(), 256);
    }

    #[test]
    fn config_section_overrides_defaults() {
        let config = dh("23", "5", 4);
        let params = ParameterProvider::load(Some(&config).into()).unwrap();

        assert_eq!(params.modulus(), &BigUint::from(23u32));
        assert_eq!(params.generator(), &BigUint::from(5u32));
        assert_eq!(params.key_size_bits(), 4);
    }

    #[test]
    fn absent_section_means_defaults() {
        assert!(matches!(ParameterSource::from(None), ParameterSource::Defaults));
    }

    #[test]
    fn non_numeric_fields_rejected() {
        let cases = [
            ("0x17", "5", "modulus"),
            ("23", "five", "generator"),
            ("", "5", "modulus"),
            ("23", "-5", "generator"),
        ];

        for (modulus, generator, field) in cases {
            let config = dh(modulus, generator, 8);
            let result = ParameterProvider::load(ParameterSource::Config(&config));
            assert!(
                matches!(&result, Err(ConfigError::InvalidNumber { field: f, .. }) if *f == field),
                "{modulus}/{generator}: {result:?}"
            );
        }
    }

    #[test]
    fn non_positive_key_size_rejected() {
        for key_size in [0, -1, i64::from(u32::MAX) + 1] {
            let result = ParameterProvider::load(ParameterSource::Config(&dh("23", "5", key_size)));
            assert!(matches!(result, Err(ConfigError::InvalidKeySize(k)) if k == key_size));
        }
    }

    #[test]
    fn generator_out_of_range_rejected() {
        for generator in ["0", "1", "23", "100"] {
            let result = ParameterProvider::load(ParameterSource::Config(&dh("23", generator, 8)));
            assert!(matches!(result, Err(ConfigError::InvalidGenerator(_))), "{generator}");
        }
    }

    #[test]
    fn tiny_modulus_rejected() {
        let result = ParameterProvider::load(ParameterSource::Config(&dh("3", "2", 8)));
        assert!(matches!(result, Err(ConfigError::InvalidParameters(_))));
    }

    proptest! {
        #[test]
        fn prop_decimal_fields_parse_exactly(value in any::<u128>()) {
            let parsed = parse_decimal("modulus", &value.to_string()).unwrap();
            prop_assert_eq!(parsed, BigUint::from(value));
        }

        #[test]
        fn prop_non_digit_input_rejected(value in "[0-9]{0,8}[^0-9][0-9a-z ]{0,8}") {
            let is_invalid_number =
                matches!(parse_decimal("generator", &value), Err(ConfigError::InvalidNumber { .. }));
            prop_assert!(is_invalid_number);
        }
    }
}
