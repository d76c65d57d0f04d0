//! Interactive confirmation on the terminal

use cboxcop_common::Share;
use cboxcop_reconcile::{Confirm, ShareRow};
use std::io::{self, BufRead, Write};

use crate::output::share_table;

/// Shows the share on stdout, then reads the answer from stdin
pub struct StdinConfirm {
    public_link_base: String,
}

impl StdinConfirm {
    pub fn new(public_link_base: impl Into<String>) -> Self {
        Self {
            public_link_base: public_link_base.into(),
        }
    }

    fn preview(&self, share: &Share) -> String {
        let row = ShareRow::new(0, share, &self.public_link_base);
        share_table(&[row], false).render()
    }
}

impl Confirm for StdinConfirm {
    fn confirm(&self, share: &Share, prompt: &str) -> io::Result<bool> {
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}{prompt} [y/N]: ", self.preview(share))?;
        stdout.flush()?;

        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        Ok(is_yes(&answer))
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cboxcop_common::{Permission, ShareType};

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES "));
        assert!(!is_yes("\n"));
        assert!(!is_yes("no"));
        assert!(!is_yes("yep"));
    }

    #[test]
    fn test_preview_shows_grantee_and_permission() {
        let share = Share {
            id: 1345,
            owner: "alice".into(),
            prefix: "newproject-c".into(),
            item_source: "12345".into(),
            share_with: "cernbox-project-cernbox-writers".into(),
            permission: Permission::ReadWrite,
            share_type: ShareType::Group,
            token: String::new(),
            stime: 0,
        };
        let preview = StdinConfirm::new("https://cernbox.cern.ch/index.php/s").preview(&share);
        let lines: Vec<&str> = preview.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        for cell in ["1345", "eosproject-c:12345", "alice", "cernbox-project-cernbox-writers", "read-write"] {
            assert!(lines[2].contains(cell), "missing {cell} in {}", lines[2]);
        }
    }
}
