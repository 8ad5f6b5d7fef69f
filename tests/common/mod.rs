#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const CAMPAIGN_HEADER: &str =
    "Item ID,Impr.,Clicks,Conversions,Conv. value,Cost,Search impr. share";

/// The two-row export used throughout: A dominates revenue, B has a `--` share.
pub const SAMPLE_EXPORT: &str = "\
Item ID,Impr.,Clicks,Conversions,Conv. value,Cost,Search impr. share
A,1000,100,10,500,100,< 10
B,500,10,1,50,50,--
";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.temp_dir.path().join(name)).expect("read temp file")
    }
}

/// Deterministic export with `rows` data rows spread over 97 items, with
/// currency symbols, thousands separators and placeholder shares mixed in.
pub fn generated_export(rows: usize) -> String {
    let mut text = String::with_capacity(rows * 48);
    text.push_str(CAMPAIGN_HEADER);
    text.push('\n');
    for i in 0..rows {
        let share = match i % 5 {
            0 => "< 10".to_string(),
            1 => "--".to_string(),
            2 => "> 90%".to_string(),
            _ => format!("{}.{}%", 10 + i % 80, i % 10),
        };
        text.push_str(&format!(
            "sku-{:03},\"{},{:03}\",{},{}.{},${}.{:02},{}.{:02},{}\n",
            i % 97,
            1 + i % 7,
            i % 1000,
            i % 300,
            i % 9,
            i % 4,
            i % 5000,
            i % 100,
            i % 700,
            (i * 7) % 100,
            share
        ));
    }
    text
}
