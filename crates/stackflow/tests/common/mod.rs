use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// stackflow/ ディレクトリを持つ一時ワークスペース
pub struct TestWorkspace {
    pub root: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir_all(root.path().join("stackflow")).unwrap();
        Self { root }
    }

    pub fn write_manifest(&self, name: &str, content: &str) {
        let dir = self.root.path().join("stackflow").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("manifest.yml"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_addon(&self, name: &str, file: &str, content: &str) {
        let dir = self.root.path().join("stackflow").join(name).join("addons");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), content).unwrap();
    }

    /// ワークスペース直下の stackflow.yml を書き、そのパスを返す
    pub fn write_settings(&self, content: &str) -> PathBuf {
        let path = self.root.path().join("stackflow.yml");
        fs::write(&path, content).unwrap();
        path
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    #[allow(dead_code)]
    pub fn read(&self, file: &str) -> String {
        fs::read_to_string(self.root.path().join(file)).unwrap()
    }
}
