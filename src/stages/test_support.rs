//! Shell-script stand-ins for the external tools.

use std::path::Path;

use crate::tools::{ToolConfig, ToolSpec};

/// Write `body` as a POSIX shell script and return a spec running it through `sh`
pub fn write_script(dir: &Path, name: &str, body: &str) -> ToolSpec {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    ToolSpec {
        program: "sh".to_string(),
        args: vec![path.display().to_string()],
    }
}

/// Fake tools that copy their input to the expected outputs
///
/// The extractor sleeps longer for cases named `slow` and `medium`, so
/// completion order differs from case order.
pub fn fake_tools(dir: &Path) -> ToolConfig {
    let converter = write_script(
        dir,
        "fake_convert.sh",
        r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
cp "$in" "$out"
"#,
    );
    let extractor = write_script(
        dir,
        "fake_bse.sh",
        r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -i) in="$2"; shift ;;
    -o) out="$2"; shift ;;
  esac
  shift
done
case "$(basename "$in")" in
  slow*) sleep 0.3 ;;
  medium*) sleep 0.15 ;;
esac
cp "$in" "$out"
"#,
    );
    let registrar = write_script(
        dir,
        "fake_ants.sh",
        r#"
while [ $# -gt 0 ]; do
  case "$1" in
    -m) moving="$2"; shift ;;
    -o) prefix="$2"; shift ;;
  esac
  shift
done
cp "$moving" "${prefix}Warped.nii.gz"
echo "rigid" > "${prefix}0GenericAffine.mat"
echo "registration done"
"#,
    );

    ToolConfig {
        converter,
        extractor,
        registrar,
        timeout: Some(std::time::Duration::from_secs(30)),
    }
}
