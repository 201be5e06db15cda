use std::collections::HashMap;
use std::fs;
use std::path::Path;

use snafu::prelude::*;

use crate::quota::*;

/// Bidirectional mapping between region codes and display names.
///
/// The JSON source maps display name to code (the direction the upstream
/// publication uses); the reverse map is derived on load. A code without a
/// known name is displayed as itself.
#[derive(Debug, Clone)]
pub struct RegionDirectory {
    name_to_code: HashMap<String, String>,
    code_to_name: HashMap<String, String>,
}

impl RegionDirectory {
    pub fn from_json_file(path: &Path) -> QuotaResult<RegionDirectory> {
        let label = path.display().to_string();
        let contents = fs::read_to_string(path).context(OpeningMappingSnafu {
            path: label.clone(),
        })?;
        let name_to_code: HashMap<String, String> =
            serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: label })?;
        Ok(Self::from_pairs(name_to_code))
    }

    pub fn from_pairs(name_to_code: HashMap<String, String>) -> RegionDirectory {
        let code_to_name = name_to_code
            .iter()
            .map(|(name, code)| (code.clone(), name.clone()))
            .collect();
        RegionDirectory {
            name_to_code,
            code_to_name,
        }
    }

    pub fn name(&self, code: &str) -> String {
        self.code_to_name
            .get(code)
            .cloned()
            .unwrap_or_else(|| code.to_string())
    }

    pub fn code(&self, name: &str) -> Option<&String> {
        self.name_to_code.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_both_directions() {
        let dir = RegionDirectory::from_pairs(HashMap::from([
            ("Guangdong".to_string(), "GD".to_string()),
            ("Zhejiang".to_string(), "ZJ".to_string()),
        ]));
        assert_eq!(dir.name("GD"), "Guangdong");
        assert_eq!(dir.code("Zhejiang"), Some(&"ZJ".to_string()));
        // Unknown codes fall back to the code itself.
        assert_eq!(dir.name("XX"), "XX");
        assert_eq!(dir.code("Atlantis"), None);
    }
}
