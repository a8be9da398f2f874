//! Converter registry
//!
//! The only place where a format code is mapped to a converter.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::error::{DocumentError, Result};
use super::traits::BookConverter;
use crate::formats::fb2::Fb2Converter;

/// Format code -> converter lookup
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<String, Arc<dyn BookConverter>>,
}

impl ConverterRegistry {
    /// Registry without any converters
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in format
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Fb2Converter::new()));
        registry
    }

    /// Register a converter under its format code
    pub fn register(&mut self, converter: Arc<dyn BookConverter>) {
        let code = converter.format().code().to_string();
        self.converters.insert(code, converter);
    }

    /// Look up the converter for a format code
    pub fn get(&self, format: &str) -> Result<Arc<dyn BookConverter>> {
        self.converters
            .get(&normalize_code(format))
            .cloned()
            .ok_or_else(|| DocumentError::UnsupportedFormat(format.to_string()))
    }

    /// Registered format codes, sorted
    pub fn formats(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.converters.keys().cloned().collect();
        codes.sort();
        codes
    }
}

fn normalize_code(format: &str) -> String {
    format.trim().to_lowercase()
}

/// Converter for a format code from the process-wide default registry
pub fn get_converter(format: &str) -> Result<Arc<dyn BookConverter>> {
    static DEFAULT: OnceLock<ConverterRegistry> = OnceLock::new();
    DEFAULT.get_or_init(ConverterRegistry::with_defaults).get(format)
}
