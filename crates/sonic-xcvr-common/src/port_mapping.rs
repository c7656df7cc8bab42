//! Logical port ↔ physical port ↔ ASIC namespace mapping.
//!
//! Loaded once at startup from the SKU's `port_config.ini` files (one per
//! ASIC namespace) and immutable afterwards:
//!
//! ```text
//! # name          lanes          alias          index
//! Ethernet0       0,1,2,3        Ethernet1/1    1
//! Ethernet4       4,5,6,7        Ethernet2/1    2
//! ```
//!
//! The `index` column names the physical cage. Breakout ports share an index;
//! a ganged port lists several (`1,2`).

use crate::config::PortConfigFile;
use crate::error::{Result, XcvrError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;

/// ASIC namespace id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct AsicId(pub u32);

impl fmt::Display for AsicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asic{}", self.0)
    }
}

/// Columns assumed when a file carries no header line.
const DEFAULT_COLUMNS: [&str; 4] = ["name", "lanes", "alias", "index"];

#[derive(Debug, Clone)]
struct LogicalPortEntry {
    asic: AsicId,
    physicals: Vec<u32>,
}

/// Immutable port mapping shared by every loop.
#[derive(Debug, Clone, Default)]
pub struct PortMapping {
    order: Vec<String>,
    logical: HashMap<String, LogicalPortEntry>,
    physical: BTreeMap<u32, Vec<String>>,
}

impl PortMapping {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every configured file. Any failure is fatal to the daemon.
    pub fn load(files: &[PortConfigFile]) -> Result<Self> {
        let mut mapping = Self::new();
        for file in files {
            let content = fs::read_to_string(&file.path)
                .map_err(|e| XcvrError::port_config(&file.path, e.to_string()))?;
            mapping.parse_into(&file.path, AsicId(file.namespace), &content)?;
        }
        if mapping.order.is_empty() {
            let path = files
                .first()
                .map(|f| f.path.clone())
                .unwrap_or_default();
            return Err(XcvrError::port_config(path, "no ports defined"));
        }
        Ok(mapping)
    }

    /// Parses one `port_config.ini` body into this mapping.
    pub fn parse_into(&mut self, path: &Path, asic: AsicId, content: &str) -> Result<()> {
        let mut columns: Vec<String> = DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect();
        let mut saw_header = false;

        for (lineno, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                let header: Vec<String> =
                    comment.split_whitespace().map(str::to_lowercase).collect();
                if !saw_header && header.first().map(String::as_str) == Some("name") {
                    columns = header;
                    saw_header = true;
                }
                continue;
            }

            let name_col = column_index(&columns, "name")
                .ok_or_else(|| XcvrError::port_config(path, "missing name column"))?;
            let index_col = column_index(&columns, "index")
                .ok_or_else(|| XcvrError::port_config(path, "missing index column"))?;

            let cells: Vec<&str> = line.split_whitespace().collect();
            let (Some(name), Some(index)) = (cells.get(name_col), cells.get(index_col)) else {
                return Err(XcvrError::port_config(
                    path,
                    format!("line {}: expected at least {} columns", lineno + 1, index_col.max(name_col) + 1),
                ));
            };

            let physicals = parse_index(index).ok_or_else(|| {
                XcvrError::port_config(path, format!("line {}: invalid index '{}'", lineno + 1, index))
            })?;

            self.insert(path, name, asic, physicals)?;
        }
        Ok(())
    }

    fn insert(&mut self, path: &Path, name: &str, asic: AsicId, physicals: Vec<u32>) -> Result<()> {
        if self.logical.contains_key(name) {
            return Err(XcvrError::port_config(
                path,
                format!("duplicate logical port '{}'", name),
            ));
        }
        for physical in &physicals {
            self.physical
                .entry(*physical)
                .or_default()
                .push(name.to_string());
        }
        self.order.push(name.to_string());
        self.logical
            .insert(name.to_string(), LogicalPortEntry { asic, physicals });
        Ok(())
    }

    /// Adds a port programmatically.
    pub fn add_port(&mut self, name: &str, asic: AsicId, physicals: Vec<u32>) -> Result<()> {
        self.insert(Path::new("<inline>"), name, asic, physicals)
    }

    /// Namespace of a logical port.
    pub fn asic_of(&self, logical: &str) -> Option<AsicId> {
        self.logical.get(logical).map(|e| e.asic)
    }

    /// Physical ports of a logical port (empty for unknown ports).
    pub fn physicals_of(&self, logical: &str) -> &[u32] {
        self.logical
            .get(logical)
            .map(|e| e.physicals.as_slice())
            .unwrap_or(&[])
    }

    /// Logical ports in file order.
    pub fn logicals(&self) -> &[String] {
        &self.order
    }

    /// Logical ports carried by a physical port.
    pub fn logicals_of(&self, physical: u32) -> &[String] {
        self.physical
            .get(&physical)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Every physical port, ascending.
    pub fn physical_ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.physical.keys().copied()
    }

    /// Every namespace that owns at least one port, ascending.
    pub fn namespaces(&self) -> Vec<AsicId> {
        let mut asics: Vec<AsicId> = self.logical.values().map(|e| e.asic).collect();
        asics.sort();
        asics.dedup();
        asics
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}

fn parse_index(cell: &str) -> Option<Vec<u32>> {
    let physicals: Option<Vec<u32>> = cell.split(',').map(|p| p.trim().parse().ok()).collect();
    physicals.filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    const SAMPLE: &str = "\
# name          lanes           alias           index    speed
Ethernet0       0,1,2,3         Ethernet1/1     1        100000
Ethernet4       4,5             Ethernet2/1     2        50000
Ethernet6       6,7             Ethernet2/3     2        50000

Ethernet8       8,9,10,11       Ethernet3/1     3,4      100000
";

    fn parse(content: &str) -> Result<PortMapping> {
        let mut mapping = PortMapping::new();
        mapping.parse_into(Path::new("test.ini"), AsicId(0), content)?;
        Ok(mapping)
    }

    #[test]
    fn test_parse_with_header() {
        let mapping = parse(SAMPLE).unwrap();
        assert_eq!(
            mapping.logicals(),
            &["Ethernet0", "Ethernet4", "Ethernet6", "Ethernet8"]
        );
        assert_eq!(mapping.physicals_of("Ethernet0"), &[1]);
        assert_eq!(mapping.physicals_of("Ethernet8"), &[3, 4]);
        assert_eq!(mapping.logicals_of(2), &["Ethernet4", "Ethernet6"]);
        assert_eq!(mapping.asic_of("Ethernet4"), Some(AsicId(0)));
        assert_eq!(mapping.physical_ports().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_port() {
        let mapping = parse(SAMPLE).unwrap();
        assert!(mapping.physicals_of("Ethernet100").is_empty());
        assert!(mapping.asic_of("Ethernet100").is_none());
        assert!(mapping.logicals_of(99).is_empty());
    }

    #[test]
    fn test_parse_without_header() {
        let mapping = parse("Ethernet0 0,1,2,3 etp1 0\nEthernet4 4,5,6,7 etp2 1\n").unwrap();
        assert_eq!(mapping.physicals_of("Ethernet4"), &[1]);
    }

    #[test]
    fn test_header_reordered_columns() {
        let mapping = parse("# name index lanes\nEthernet0 7 0,1\n").unwrap();
        assert_eq!(mapping.physicals_of("Ethernet0"), &[7]);
    }

    #[test]
    fn test_malformed_index() {
        assert!(parse("# name lanes alias index\nEthernet0 0 etp1 abc\n").is_err());
    }

    #[test]
    fn test_missing_index_column() {
        assert!(parse("# name lanes alias\nEthernet0 0 etp1\n").is_err());
    }

    #[test]
    fn test_duplicate_port() {
        assert!(parse("Ethernet0 0 a 1\nEthernet0 1 b 2\n").is_err());
    }

    #[test]
    fn test_load_multi_asic() {
        let dir = tempfile::tempdir().unwrap();
        let asic0 = dir.path().join("asic0.ini");
        let asic1 = dir.path().join("asic1.ini");
        writeln!(fs::File::create(&asic0).unwrap(), "Ethernet0 0 a 1").unwrap();
        writeln!(fs::File::create(&asic1).unwrap(), "Ethernet64 64 b 17").unwrap();

        let mapping = PortMapping::load(&[
            PortConfigFile { namespace: 0, path: asic0 },
            PortConfigFile { namespace: 1, path: asic1 },
        ])
        .unwrap();

        assert_eq!(mapping.asic_of("Ethernet64"), Some(AsicId(1)));
        assert_eq!(mapping.namespaces(), vec![AsicId(0), AsicId(1)]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = PortMapping::load(&[PortConfigFile {
            namespace: 0,
            path: PathBuf::from("/nonexistent/port_config.ini"),
        }])
        .unwrap_err();
        assert!(matches!(err, XcvrError::PortConfig { .. }));
    }

    #[test]
    fn test_load_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = PortMapping::load(&[PortConfigFile {
            namespace: 0,
            path: file.path().to_path_buf(),
        }])
        .unwrap_err();
        assert!(matches!(err, XcvrError::PortConfig { .. }));
    }
}
