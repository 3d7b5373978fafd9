use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use ffdyn::abi::MediaType;
use ffdyn::component::Component;
use ffdyn::config::LibraryConfig;
use ffdyn::error::FfError;
use ffdyn::registry::Registry;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "ffdyn", about = "Inspect FFmpeg libraries loaded at run time")]
struct Args {
    /// TOML file with library paths
    #[arg(long)]
    config: Option<PathBuf>,

    /// directory containing the FFmpeg shared libraries
    #[arg(long)]
    lib_dir: Option<PathBuf>,

    /// explicit library path, e.g. avutil=/opt/ffmpeg/lib/libavutil.so.56 (repeatable)
    #[arg(long = "lib", value_parser = parse_lib_override)]
    libs: Vec<(Component, PathBuf)>,

    /// skip the major version check against the mirrored ABI
    #[arg(long)]
    no_verify: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print version and license of every component that can be loaded
    Versions {
        /// also print the build configuration
        #[arg(long)]
        verbose: bool,
    },
    /// describe an FFmpeg error code
    Strerror {
        #[arg(allow_hyphen_values = true)]
        code: i32,
    },
    /// show a pixel format descriptor
    PixFmt { name: String },
    /// show a filter and its pads
    Filter { name: String },
    /// list every registered filter
    Filters,
    /// list media type names
    MediaTypes,
}

fn parse_lib_override(s: &str) -> Result<(Component, PathBuf), String> {
    let (component, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected COMPONENT=PATH, got `{s}`"))?;
    Ok((component.parse()?, PathBuf::from(path)))
}

fn main() -> Result<(), FfError> {
    init_tracing();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LibraryConfig::load(path)?,
        None => LibraryConfig::default(),
    };
    if let Some(dir) = &args.lib_dir {
        config.set_search_dir(dir);
    }
    for (component, path) in &args.libs {
        if !Path::new(path).exists() {
            return Err(FfError::Load {
                component: *component,
                path: path.clone(),
                source: "file does not exist".into(),
            });
        }
        config.set_path(*component, path);
    }
    if args.no_verify {
        config.verify_version = false;
    }

    let registry = Registry::new(config);
    run(&registry, args.command)?;

    let stats = registry.stats();
    tracing::debug!(
        libraries = stats.libraries_opened,
        lookups = stats.symbol_lookups,
        "done"
    );
    registry.close_all();

    Ok(())
}

fn run(registry: &Registry, command: Command) -> Result<(), FfError> {
    match command {
        Command::Versions { verbose } => {
            let avutil = registry.avutil();
            match avutil.version_info() {
                Ok(release) => println!("FFmpeg {release}"),
                Err(err) => tracing::warn!(error = %err, "release string unavailable"),
            }
            for &component in Component::ALL {
                match registry.component_info(component) {
                    Ok(info) => {
                        println!("{:<14} {:<10} {}", component.to_string(), info.version, info.license);
                        if verbose {
                            println!("{:<14} {}", "", info.configuration);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%component, error = %err, "component unavailable");
                        println!("{:<14} unavailable", component.to_string());
                    }
                }
            }
        }
        Command::Strerror { code } => {
            println!("{}", registry.avutil().strerror(code)?);
        }
        Command::PixFmt { name } => {
            let avutil = registry.avutil();
            let Some(fmt) = avutil.pix_fmt_by_name(&name)? else {
                println!("unknown pixel format: {name}");
                return Ok(());
            };
            if let Some(desc) = avutil.pix_fmt_descriptor(fmt)? {
                println!("name:       {} ({fmt})", desc.name);
                println!("components: {}", desc.nb_components);
                println!("chroma:     {}x{} (log2)", desc.log2_chroma_w, desc.log2_chroma_h);
                println!("depths:     {:?}", desc.bits_per_component());
                println!("flags:      {}", desc.flag_names().join(","));
                if let Some(alias) = desc.alias {
                    println!("alias:      {alias}");
                }
            }
        }
        Command::Filter { name } => {
            let Some(filter) = registry.avfilter().filter(&name)? else {
                println!("unknown filter: {name}");
                return Ok(());
            };
            println!("{}: {}", filter.name, filter.description);
            let flags = filter.flag_names();
            if !flags.is_empty() {
                println!("  flags: {}", flags.join(","));
            }
            for (direction, pads) in [("input", &filter.inputs), ("output", &filter.outputs)] {
                if pads.is_empty() {
                    println!("  no static {direction}s");
                }
                for pad in pads {
                    let kind = pad
                        .media_type
                        .map_or_else(|| "unknown".to_string(), |t| format!("{t:?}").to_lowercase());
                    println!("  {direction} {} ({kind})", pad.name);
                }
            }
        }
        Command::Filters => {
            for name in registry.avfilter().filter_names()? {
                println!("{name}");
            }
        }
        Command::MediaTypes => {
            let avutil = registry.avutil();
            for media_type in MediaType::ALL {
                let name = avutil.media_type_string(media_type)?;
                println!("{:>2} {}", media_type.as_raw(), name.as_deref().unwrap_or("-"));
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
