//! Table and JSON rendering

use anyhow::Result;
use cboxcop_common::ProjectSpace;
use cboxcop_reconcile::ShareRow;
use serde::Serialize;

/// Left-aligned text table sized to its widest cells
pub struct Table {
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub const fn new(headers: Vec<&'static str>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        let header: Vec<String> = self.headers.iter().map(ToString::to_string).collect();
        push_line(&mut out, &header, &widths);
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        push_line(&mut out, &rule, &widths);
        for row in &self.rows {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Share listing table; the path column only when paths were resolved
pub fn share_table(rows: &[ShareRow], print_paths: bool) -> Table {
    let mut headers = vec![
        "ID",
        "FILEID",
        "OWNER",
        "TYPE",
        "SHARE_WITH",
        "PERMISSION",
        "URL",
    ];
    if print_paths {
        headers.push("PATH");
    }
    let mut table = Table::new(headers);
    for row in rows {
        let mut cells = vec![
            row.id.to_string(),
            row.file_id.clone(),
            row.owner.clone(),
            row.share_type.clone(),
            row.share_with.clone(),
            row.permission.clone(),
            row.public_link.clone(),
        ];
        if print_paths {
            cells.push(row.path.clone().unwrap_or_default());
        }
        table.push(cells);
    }
    table
}

/// A project as listed, with its probed path when requested
#[derive(Debug, Serialize)]
pub struct ProjectRow {
    pub name: String,
    pub rel_path: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ProjectRow {
    pub fn new(project: ProjectSpace, path: Option<String>) -> Self {
        Self {
            name: project.name,
            rel_path: project.rel_path,
            owner: project.owner,
            path,
        }
    }
}

pub fn project_table(rows: &[ProjectRow], print_paths: bool) -> Table {
    let mut headers = vec!["NAME", "RELATIVE_PATH", "OWNER"];
    if print_paths {
        headers.push("PATH");
    }
    let mut table = Table::new(headers);
    for row in rows {
        let mut cells = vec![row.name.clone(), row.rel_path.clone(), row.owner.clone()];
        if print_paths {
            cells.push(row.path.clone().unwrap_or_default());
        }
        table.push(cells);
    }
    table
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cboxcop_common::{Permission, Share, ShareType};

    #[test]
    fn test_table_pads_to_widest_cell() {
        let mut table = Table::new(vec!["NAME", "OWNER"]);
        table.push(vec!["cernbox".into(), "cboxsvc".into()]);
        table.push(vec!["cms".into(), "cmssvc".into()]);
        assert_eq!(
            table.render(),
            "NAME     OWNER\n-------  -------\ncernbox  cboxsvc\ncms      cmssvc\n"
        );
    }

    #[test]
    fn test_share_table_path_column() {
        let share = Share {
            id: 1345,
            owner: "alice".into(),
            prefix: "newproject-c".into(),
            item_source: "12345".into(),
            share_with: "bob".into(),
            permission: Permission::ReadOnly,
            share_type: ShareType::User,
            token: String::new(),
            stime: 0,
        };
        let mut row = ShareRow::new(0, &share, "https://cernbox.cern.ch/index.php/s");
        let plain = share_table(std::slice::from_ref(&row), false).render();
        assert!(plain.starts_with("ID  "));
        assert!(!plain.contains("PATH"));

        row.path = Some("/eos/project/c/cernbox/file".into());
        let with_path = share_table(&[row], true).render();
        assert!(with_path.contains("PATH"));
        assert!(with_path.contains("/eos/project/c/cernbox/file"));
        assert!(with_path.contains("eosproject-c:12345"));
    }

    #[test]
    fn test_project_row_json_omits_missing_path() {
        let project = ProjectSpace::new("cernbox", "cboxsvc").unwrap();
        let json = serde_json::to_value(ProjectRow::new(project, None)).unwrap();
        assert_eq!(json["rel_path"], "c/cernbox");
        assert!(json.get("path").is_none());
    }
}
