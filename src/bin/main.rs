use std::io::Write;
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use log::LevelFilter;
use structopt::StructOpt;

use objdelta::Outcome;

/// Generate a live-patch object from a source/patched object pair.
#[derive(Debug, StructOpt)]
#[structopt(name = "objdelta")]
struct Opt {
    /// Source object
    #[structopt(short = "s", long = "source")]
    source: PathBuf,

    /// Patched object
    #[structopt(short = "p", long = "patched")]
    patched: PathBuf,

    /// Running binary file
    #[structopt(short = "r", long = "running")]
    running: PathBuf,

    /// Output object
    #[structopt(short = "o", long = "output")]
    output: PathBuf,

    /// Show debug output
    #[structopt(short = "d", long = "debug")]
    debug: bool,
}

fn run(opt: &Opt) -> anyhow::Result<Outcome> {
    objdelta::create_patch_object(&opt.source, &opt.patched, &opt.running, &opt.output)
        .with_context(|| {
            format!(
                "diffing {} against {}",
                opt.source.display(),
                opt.patched.display()
            )
        })
}

fn main() {
    let opt = Opt::from_args();

    // every diagnostic carries the source object's basename
    let prefix = opt
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "objdelta".into());
    let level = if opt.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format(move |buf, record| writeln!(buf, "{}: {}", prefix, record.args()))
        .init();

    if let Err(err) = run(&opt) {
        log::error!("{:#}", err);
        process::exit(1);
    }
}
