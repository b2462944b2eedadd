//! Country lookup via the MaxMind GeoLite2-Country database.
//!
//! Used by the embedding daemon to fill in a missing country code from
//! the source IP before ingestion. The database file must be downloaded
//! separately from MaxMind; a failed lookup is never an ingestion error,
//! the event simply keeps an unknown country.

use maxminddb::{geoip2, Reader};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during country lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Country data missing for IP address")]
    NoCountry,

    #[error("Database file not found: {0}")]
    FileNotFound(String),
}

/// Resolver from source IP to ISO 3166-1 alpha-2 country code
pub struct CountryResolver {
    reader: Arc<Reader<Vec<u8>>>,
}

impl CountryResolver {
    /// Open a MaxMind GeoLite2-Country database file
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(CountryResolver {
            reader: Arc::new(reader),
        })
    }

    /// Look up the country code for an IP address
    pub fn lookup(&self, ip: &IpAddr) -> Result<String, GeoError> {
        let country: geoip2::Country = self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        country
            .country
            .and_then(|c| c.iso_code)
            .map(String::from)
            .ok_or(GeoError::NoCountry)
    }

    /// Look up an IP, returning None instead of an error
    pub fn lookup_optional(&self, ip: &IpAddr) -> Option<String> {
        self.lookup(ip).ok()
    }
}

impl Clone for CountryResolver {
    fn clone(&self) -> Self {
        CountryResolver {
            reader: Arc::clone(&self.reader),
        }
    }
}
