//! Command-line interface for the weft compiler.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use weft_ir::rewrite::DEFAULT_MAX_ITERATIONS;
use weft_nvptx::SerializeOptions;

#[derive(Parser)]
#[command(name = "weftc")]
#[command(about = "OpenMP region optimizer and GPU module serializer for weft IR", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Merge adjacent parallel regions and hoist them out of loops and conditionals
    OmpOpt {
        /// IR file to optimize
        input: PathBuf,

        /// Maximum number of rewrite passes
        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: usize,
    },
    /// Compile every gpu.module to a device binary
    Serialize {
        /// IR file to compile
        input: PathBuf,

        /// Run the OpenMP region optimization first
        #[arg(long)]
        omp_opt: bool,

        #[command(flatten)]
        options: SerializeOptions,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omp_opt_defaults_to_driver_cap() {
        let cli = Cli::try_parse_from(["weftc", "omp-opt", "in.weft"]).unwrap();
        match cli.command {
            Command::OmpOpt {
                input,
                max_iterations,
            } => {
                assert_eq!(input, PathBuf::from("in.weft"));
                assert_eq!(max_iterations, 47);
            }
            Command::Serialize { .. } => panic!("expected omp-opt"),
        }
    }

    #[test]
    fn serialize_takes_pass_options() {
        let cli = Cli::try_parse_from([
            "weftc",
            "serialize",
            "in.weft",
            "--ptxas-path",
            "/opt/cuda/bin/ptxas",
            "--libdevice-path",
            "libdevice.ll",
            "--chip",
            "sm_70",
            "--output-intermediate",
        ])
        .unwrap();
        let Command::Serialize {
            omp_opt, options, ..
        } = cli.command
        else {
            panic!("expected serialize");
        };
        assert!(!omp_opt);
        assert_eq!(options.chip, "sm_70");
        assert_eq!(options.ptxas_path, PathBuf::from("/opt/cuda/bin/ptxas"));
        assert!(options.output_intermediate);
        assert_eq!(options.llvm_opt_level, 3);
    }
}
