//! Invocation of the external PTX assembler.

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::errors::{SerializeError, SerializeErrorKind, SerializeResult};
use crate::options::SerializeOptions;
use crate::target::is_arch_64_bit;

/// Command line for assembling `input` into `output`.
pub fn ptxas_args(options: &SerializeOptions, input: &Path, output: &Path) -> Vec<OsString> {
    let machine = if is_arch_64_bit(&options.triple) {
        "-m64"
    } else {
        "-m32"
    };
    vec![
        machine.into(),
        "--gpu-name".into(),
        options.chip.as_str().into(),
        "--opt-level".into(),
        options.ptxas_opt_level.to_string().into(),
        "--verbose".into(),
        "--output-file".into(),
        output.as_os_str().to_owned(),
        input.as_os_str().to_owned(),
    ]
}

/// Assemble `isa` with `options.ptxas_path` and return the binary.
///
/// The assembly and the binary live in temporary files that are removed
/// on every exit path. The assembler's exit status is not checked; an
/// empty output file is reported as [`SerializeErrorKind::EmptyOutput`].
pub fn serialize_isa(isa: &str, name: &str, options: &SerializeOptions) -> SerializeResult<Vec<u8>> {
    if options.output_intermediate {
        println!("PTX module for: {name}\n{isa}");
    }
    debug!("PTX module for: {name}\n{isa}");

    let dir = options.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
    let mut input = tempfile::Builder::new()
        .prefix("isainput")
        .suffix(".s")
        .tempfile_in(&dir)
        .map_err(SerializeError::temp_file)?;
    let output = tempfile::Builder::new()
        .prefix("cubinoutput")
        .suffix(".cubin")
        .tempfile_in(&dir)
        .map_err(SerializeError::temp_file)?;

    writeln!(input, "{isa}")
        .and_then(|()| input.flush())
        .map_err(SerializeError::temp_file)?;

    let args = ptxas_args(options, input.path(), output.path());
    debug!(assembler = %options.ptxas_path.display(), ?args, "running assembler");
    let status = Command::new(&options.ptxas_path)
        .args(&args)
        .status()
        .map_err(|err| SerializeErrorKind::AssemblerSpawn(err.to_string()))?;
    debug!(%status, "assembler finished");

    let blob = std::fs::read(output.path())
        .map_err(|err| SerializeErrorKind::ReadOutput(err.to_string()))?;
    if blob.is_empty() {
        return Err(SerializeErrorKind::EmptyOutput.into());
    }
    Ok(blob)
}
