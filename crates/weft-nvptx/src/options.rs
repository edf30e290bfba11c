//! Options of the serialize-to-cubin pipeline.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Clone, Debug, PartialEq)]
pub struct SerializeOptions {
    /// Target triple used for translation and code generation.
    #[arg(long, default_value = "nvptx64-nvidia-cuda")]
    pub triple: String,

    /// Target GPU, passed to the assembler as `--gpu-name`.
    #[arg(long, default_value = "sm_35")]
    pub chip: String,

    /// Target features, such as the PTX ISA version.
    #[arg(long, default_value = "+ptx60")]
    pub features: String,

    /// Optimization level of the module optimizer, 0 to 3.
    #[arg(long = "opt-level", default_value_t = 3, allow_negative_numbers = true)]
    pub llvm_opt_level: i32,

    /// Optimization level passed to the assembler.
    #[arg(long = "ptxas-opt-level", default_value_t = 3)]
    pub ptxas_opt_level: u32,

    /// Path to the `ptxas` executable.
    #[arg(long)]
    pub ptxas_path: PathBuf,

    /// Device library linked into every module.
    #[arg(long)]
    pub libdevice_path: PathBuf,

    /// Print the module before and after optimization, and the PTX.
    #[arg(long)]
    pub output_intermediate: bool,

    /// Directory for the assembler's temporary files.
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            triple: "nvptx64-nvidia-cuda".to_owned(),
            chip: "sm_35".to_owned(),
            features: "+ptx60".to_owned(),
            llvm_opt_level: 3,
            ptxas_opt_level: 3,
            ptxas_path: PathBuf::from("ptxas"),
            libdevice_path: PathBuf::from("libdevice.ll"),
            output_intermediate: false,
            temp_dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        options: SerializeOptions,
    }

    const REQUIRED: [&str; 5] = [
        "weftc",
        "--ptxas-path",
        "ptxas",
        "--libdevice-path",
        "libdevice.ll",
    ];

    #[test]
    fn defaults_match_command_line_defaults() {
        let parsed = Harness::parse_from(REQUIRED);
        assert_eq!(parsed.options, SerializeOptions::default());
    }

    #[test]
    fn paths_are_required() {
        assert!(Harness::try_parse_from(["weftc"]).is_err());
    }

    #[test]
    fn negative_levels_reach_validation() {
        let args = REQUIRED
            .into_iter()
            .chain(["--opt-level", "-1", "--chip", "sm_80"]);
        let parsed = Harness::parse_from(args);
        assert_eq!(parsed.options.llvm_opt_level, -1);
        assert_eq!(parsed.options.chip, "sm_80");
    }
}
