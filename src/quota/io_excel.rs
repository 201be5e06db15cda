use std::collections::BTreeMap;
use std::path::Path;

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, warn};
use snafu::prelude::*;

use crate::quota::{config_reader::ParticipantsSource, *};

/// Reads the published participant table from the first worksheet of an
/// Excel workbook. Same row semantics as the CSV provider.
pub fn read_participants_xlsx(
    path: &Path,
    cfs: &ParticipantsSource,
) -> QuotaResult<BTreeMap<String, u64>> {
    let label = path.display().to_string();
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningExcelSnafu {
        path: label.clone(),
    })?;
    let wrange = workbook
        .worksheet_range_at(0)
        .context(EmptyExcelSnafu {
            path: label.clone(),
        })?
        .context(OpeningExcelSnafu {
            path: label.clone(),
        })?;

    let header = wrange.rows().next().context(EmptyExcelSnafu {
        path: label.clone(),
    })?;
    debug!("header: {:?}", header);
    let code_idx = excel_column(header, cfs.code_column().as_str(), label.as_str())?;
    let count_idx = excel_column(header, cfs.count_column().as_str(), label.as_str())?;
    let total_label = cfs.total_label();

    let mut iter = wrange.rows();
    iter.next();
    let mut res: BTreeMap<String, u64> = BTreeMap::new();
    for (idx, row) in iter.enumerate() {
        let lineno = idx + 2;
        let code = match row.get(code_idx) {
            Some(DataType::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                warn!("{}: row {}: empty region code, skipping", label, lineno);
                continue;
            }
        };
        if code == total_label {
            continue;
        }
        let count: Option<u64> = match row.get(count_idx) {
            Some(DataType::Float(f)) if *f >= 0.0 => Some(*f as u64),
            Some(DataType::Int(i)) if *i >= 0 => Some(*i as u64),
            Some(DataType::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        match count {
            Some(c) => {
                *res.entry(code).or_insert(0) += c;
            }
            None => {
                warn!(
                    "{}: row {}: participant count is not a number, skipping",
                    label, lineno
                );
            }
        }
    }
    Ok(res)
}

fn excel_column(header: &[DataType], name: &str, label: &str) -> QuotaResult<usize> {
    header
        .iter()
        .position(|c| matches!(c, DataType::String(s) if s.trim() == name))
        .context(MissingColumnSnafu {
            column: name.to_string(),
            path: label.to_string(),
        })
}
