//! UDIN 来源：从上传的表格中读出待处理的标识列表
//!
//! 只读第一个工作表，首行为表头。空单元格被丢弃，顺序与重复项原样保留。

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::error::SchemaError;

/// 标识来源：把上传的文件转为有序的 UDIN 列表
pub trait IdentifierSource: Send + Sync {
    fn extract(&self, path: &Path) -> Result<Vec<String>, SchemaError>;
}

/// Excel / ODS 表格来源
#[derive(Debug, Clone)]
pub struct SpreadsheetSource {
    column: String,
}

impl SpreadsheetSource {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
        }
    }
}

impl IdentifierSource for SpreadsheetSource {
    fn extract(&self, path: &Path) -> Result<Vec<String>, SchemaError> {
        extract(path, &self.column)
    }
}

/// 读取表格中 `column` 列的所有非空值
pub fn extract(path: &Path, column: &str) -> Result<Vec<String>, SchemaError> {
    let shown = path.display().to_string();
    let mut workbook =
        open_workbook_auto(path).map_err(|e| SchemaError::from(e).at(&shown))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SchemaError::EmptyWorkbook {
            path: shown.clone(),
        })?
        .map_err(|e| SchemaError::from(e).at(&shown))?;

    if range.is_empty() {
        return Err(SchemaError::EmptyWorkbook { path: shown });
    }

    let identifiers = collect_column(range.rows(), column)?;
    debug!("从 {} 读取到 {} 个 UDIN", shown, identifiers.len());
    Ok(identifiers)
}

/// 按表头定位列并收集值
///
/// 第一行视为表头；表头不含 `column` 时返回 [`SchemaError::MissingColumn`]。
pub fn collect_column<'a, I>(rows: I, column: &str) -> Result<Vec<String>, SchemaError>
where
    I: IntoIterator<Item = &'a [Data]>,
{
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or_else(|| SchemaError::MissingColumn {
        column: column.to_string(),
    })?;

    let index = header
        .iter()
        .position(|cell| matches!(cell, Data::String(name) if name.trim() == column))
        .ok_or_else(|| SchemaError::MissingColumn {
            column: column.to_string(),
        })?;

    Ok(rows
        .filter_map(|row| row.get(index).and_then(cell_text))
        .collect())
}

/// 单元格转文本；空值返回 None
fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // 纯数字的 UDIN 会被 Excel 存为浮点数
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    };
    (!text.is_empty()).then_some(text)
}
