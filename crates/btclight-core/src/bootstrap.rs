//! Bootstrap data loader.
//!
//! A bootstrap file seeds an empty light client with a run of consecutive
//! headers:
//!
//! ```json
//! { "network": "regressionnet", "start_height": 0, "blockheaders": ["0000..."] }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::Network;
use crate::error::BootstrapError;
use crate::types::BlockHeader;

/// Raw bootstrap document as stored on disk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BootstrapData {
    pub network: String,
    pub start_height: u64,
    pub blockheaders: Vec<String>,
}

/// Bootstrap document with the network resolved and headers decoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bootstrap {
    pub network: Network,
    pub start_height: u64,
    pub headers: Vec<BlockHeader>,
}

impl BootstrapData {
    /// Parse a bootstrap document from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, BootstrapError> {
        serde_json::from_str(json).map_err(|e| BootstrapError::Json(e.to_string()))
    }

    /// Read and parse a bootstrap file.
    pub fn read(path: &Path) -> Result<Self, BootstrapError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| BootstrapError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Resolve the network name and decode every header.
    pub fn decode(&self) -> Result<Bootstrap, BootstrapError> {
        let network: Network = self.network.parse()?;
        let headers = self
            .blockheaders
            .iter()
            .enumerate()
            .map(|(index, hex)| {
                BlockHeader::from_hex(hex).map_err(|source| BootstrapError::Header { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Bootstrap { network, start_height: self.start_height, headers })
    }
}

/// Read, parse, and decode a bootstrap file in one step.
pub fn load(path: &Path) -> Result<Bootstrap, BootstrapError> {
    BootstrapData::read(path)?.decode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HeaderError;
    use std::io::Write;

    const TESTNET_HEADER: &str = "020000004cdba1415b2c6e7808c1b3c18df1374238454f7104203475bf01000000000000c17ea9d06015dc83902911cd24837a8ba4bdc0c1d72b873f906d921e06e48d2f984a8250ef75051a72a8061a";

    #[test]
    fn decodes_valid_document() {
        let json = format!(
            r#"{{"network":"testnet3","start_height":100,"blockheaders":["{TESTNET_HEADER}"]}}"#
        );
        let bootstrap = BootstrapData::from_json(&json).unwrap().decode().unwrap();
        assert_eq!(bootstrap.network, Network::Testnet3);
        assert_eq!(bootstrap.start_height, 100);
        assert_eq!(bootstrap.headers.len(), 1);
        assert_eq!(bootstrap.headers[0].bits, 0x1a0575ef);
    }

    #[test]
    fn unknown_network_is_rejected() {
        let data = BootstrapData {
            network: "litecoin".into(),
            start_height: 0,
            blockheaders: vec![],
        };
        assert_eq!(data.decode(), Err(BootstrapError::UnknownNetwork("litecoin".into())));
    }

    #[test]
    fn bad_header_reports_index() {
        let data = BootstrapData {
            network: "mainnet".into(),
            start_height: 0,
            blockheaders: vec![TESTNET_HEADER.into(), "abcd".into()],
        };
        assert_eq!(
            data.decode(),
            Err(BootstrapError::Header {
                index: 1,
                source: HeaderError::InvalidHeaderSize { got: 2 },
            })
        );
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(BootstrapData::from_json("{"), Err(BootstrapError::Json(_))));
        assert!(matches!(
            BootstrapData::from_json(r#"{"network":"mainnet"}"#),
            Err(BootstrapError::Json(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"network":"regressionnet","start_height":0,"blockheaders":["{TESTNET_HEADER}"]}}"#
        )
        .unwrap();
        let bootstrap = load(file.path()).unwrap();
        assert_eq!(bootstrap.network, Network::Regressionnet);

        let missing = load(Path::new("/nonexistent/bootstrap.json"));
        assert!(matches!(missing, Err(BootstrapError::Io(_))));
    }
}
