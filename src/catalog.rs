//! Return-semantics catalog (component B).
//!
//! Loads the CSV catalog of library functions with known return-value
//! domains and normal/error predicate fragments, and exposes lookup by
//! `(call_name, call_def_loc)`. First row wins on a duplicate key, matching
//! the upstream importer's `pandas.read_csv` + SQLite replace semantics.

use std::path::Path;

use indexmap::IndexMap;

use crate::error::CatalogError;
use crate::model::ReturnType;

/// One row of `glibc_return.csv`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub domain: String,
    pub call_name: String,
    pub call_def_loc: String,
    pub return_type: ReturnType,
    /// Formula fragment referencing `<call_name>_0`, true on F's normal path.
    pub normal_query: String,
    /// Formula fragment referencing `<call_name>_0`, true on F's error path.
    pub error_query: String,
}

/// Lookup table keyed by `(CallName, CallDefLoc)`.
#[derive(Debug, Clone, Default)]
pub struct ReturnCatalog {
    entries: IndexMap<(String, String), CatalogEntry>,
}

impl ReturnCatalog {
    /// Parse `glibc_return.csv` (header:
    /// `DomainName,CallName,CallDefLoc,ReturnType,NormalQuery,ErrorQuery`).
    pub fn load_csv(path: &Path) -> Result<Self, CatalogError> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut entries: IndexMap<(String, String), CatalogEntry> = IndexMap::new();
        for result in reader.records() {
            let record = result?;
            let domain = record.get(0).unwrap_or_default().to_string();
            let call_name = record.get(1).unwrap_or_default().to_string();
            let call_def_loc = record.get(2).unwrap_or_default().to_string();
            let return_type_raw = record.get(3).unwrap_or_default();
            let normal_query = record.get(4).unwrap_or_default().to_string();
            let error_query = record.get(5).unwrap_or_default().to_string();

            let return_type = return_type_raw
                .parse::<ReturnType>()
                .map_err(CatalogError::UnknownReturnType)?;

            let key = (call_name.clone(), call_def_loc.clone());
            entries.entry(key).or_insert(CatalogEntry {
                domain,
                call_name,
                call_def_loc,
                return_type,
                normal_query,
                error_query,
            });
        }
        Ok(Self { entries })
    }

    /// Look up a catalog entry by callee name and definition location.
    pub fn lookup(&self, call_name: &str, call_def_loc: &str) -> Option<&CatalogEntry> {
        self.entries
            .get(&(call_name.to_string(), call_def_loc.to_string()))
    }

    /// Number of distinct `(CallName, CallDefLoc)` entries loaded.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all loaded entries, in insertion (first-seen) order.
    pub fn entries(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(rows: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "DomainName,CallName,CallDefLoc,ReturnType,NormalQuery,ErrorQuery").unwrap();
        write!(file, "{rows}").unwrap();
        file
    }

    #[test]
    fn loads_and_looks_up_entry() {
        let file = write_csv("libc,malloc,stdlib.h,POINTER,malloc_0 != 0,malloc_0 == 0\n");
        let catalog = ReturnCatalog::load_csv(file.path()).unwrap();
        let entry = catalog.lookup("malloc", "stdlib.h").unwrap();
        assert_eq!(entry.return_type, ReturnType::Pointer);
        assert_eq!(entry.normal_query, "malloc_0 != 0");
        assert!(catalog.lookup("free", "stdlib.h").is_none());
    }

    #[test]
    fn first_row_wins_on_duplicate_key() {
        let file = write_csv(
            "libc,open,fcntl.h,INT,open_0 >= 0,open_0 < 0\nlibc,open,fcntl.h,INT,open_0 > 0,open_0 <= 0\n",
        );
        let catalog = ReturnCatalog::load_csv(file.path()).unwrap();
        let entry = catalog.lookup("open", "fcntl.h").unwrap();
        assert_eq!(entry.normal_query, "open_0 >= 0");
    }

    #[test]
    fn unknown_return_type_is_rejected() {
        let file = write_csv("libc,weird,weird.h,STRING,weird_0,weird_0\n");
        let err = ReturnCatalog::load_csv(file.path()).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownReturnType(_)));
    }
}
