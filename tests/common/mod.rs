//! Adapter stubs shared by the integration tests.
//!
//! Every stub lives in its own template directory as `adapter`. All of them
//! are written once, before any test spawns a process, so no test ever execs
//! a file another thread still holds open for writing (ETXTBSY).

#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;
use tilt_bridge::{BridgeConfig, RenderBridge};

pub struct Fixtures {
    root: TempDir,
}

const STUBS: &[(&str, &str)] = &[
    // Fixed heading, ignores its input
    ("heading", "cat > /dev/null\nprintf '<h1>Hi</h1>' > \"$3\"\n"),
    // Echoes the raw context payload
    ("echo_context", "cat > \"$3\"\n"),
    // Echoes template dir and template name, one per line
    ("echo_args", "cat > /dev/null\nprintf '%s\\n%s\\n' \"$1\" \"$2\" > \"$3\"\n"),
    // Template name followed by the payload
    ("name_and_context", "{ printf '%s|' \"$2\"; cat; } > \"$3\"\n"),
    // Raw bytes that are not valid UTF-8
    ("binary", "cat > /dev/null\nprintf '\\000\\377\\376abc' > \"$3\"\n"),
    // Never finishes
    ("hang", "exec sleep 30\n"),
    // Exits cleanly without writing anything
    ("silent", "cat > /dev/null\nexit 0\n"),
    // Fails loudly without output
    ("fail", "cat > /dev/null\necho 'undefined local variable title' >&2\nexit 3\n"),
    // Fails but still leaves output behind
    ("fail_with_output", "cat > /dev/null\nprintf 'partial' > \"$3\"\nexit 2\n"),
    // Exits without reading stdin at all
    ("ignore_stdin", "printf 'done' > \"$3\"\n"),
    // Floods stderr before writing output
    ("noisy", "cat > /dev/null\nhead -c 1048576 /dev/zero >&2\nprintf 'ok' > \"$3\"\n"),
    // Writes an empty output file
    ("empty", "cat > /dev/null\n: > \"$3\"\n"),
    // Leaves a background child holding stderr open
    ("background_stderr", "cat > /dev/null\nsleep 30 &\nprintf 'ok' > \"$3\"\n"),
    // Leaves a background child holding stdin open without reading it
    (
        "background_stdin",
        "exec 3<&0\nsleep 30 <&3 2>/dev/null &\nprintf 'done' > \"$3\"\n",
    ),
    // Hangs in the foreground while a subshell would write output late
    (
        "hang_with_child",
        "cat > /dev/null\n( sleep 1; printf 'late' > \"$3\" ) &\nwait\n",
    ),
];

impl Fixtures {
    fn build() -> Self {
        let root = tempfile::Builder::new()
            .prefix("tilt-bridge-stubs")
            .tempdir()
            .expect("stub root");

        for (name, body) in STUBS {
            write_script(&root.path().join(name), &format!("#!/bin/sh\n{}", body), 0o755);
        }
        // Present but lacking the executable bit
        write_script(
            &root.path().join("not_executable"),
            "#!/bin/sh\nprintf 'x' > \"$3\"\n",
            0o644,
        );
        std::fs::create_dir_all(root.path().join("no_adapter")).expect("empty template dir");

        Self { root }
    }

    /// Template directory whose `adapter` is the named stub. Ends with `/`
    /// the way host views directories usually do.
    pub fn dir(&self, stub: &str) -> PathBuf {
        let mut dir = self.root.path().join(stub).into_os_string();
        dir.push("/");
        PathBuf::from(dir)
    }
}

fn write_script(dir: &Path, contents: &str, mode: u32) {
    std::fs::create_dir_all(dir).expect("stub dir");
    let adapter = dir.join("adapter");
    std::fs::write(&adapter, contents).expect("write stub");
    std::fs::set_permissions(&adapter, std::fs::Permissions::from_mode(mode)).expect("chmod stub");
}

pub fn fixtures() -> &'static Fixtures {
    static FIXTURES: OnceLock<Fixtures> = OnceLock::new();
    FIXTURES.get_or_init(Fixtures::build)
}

/// Bridge over the named stub with its own private scratch directory.
pub fn bridge_for(stub: &str, config: BridgeConfig) -> (RenderBridge, TempDir) {
    let scratch = tempfile::tempdir().expect("scratch dir");
    let config = BridgeConfig {
        scratch_dir: Some(scratch.path().to_path_buf()),
        ..config
    };
    let bridge = RenderBridge::new(fixtures().dir(stub), config).expect("bridge");
    (bridge, scratch)
}

pub fn scratch_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|it| it.count()).unwrap_or(0)
}
