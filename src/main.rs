use anyhow::{anyhow, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use folio::build::build_site;
use folio::config::Config;
use folio::content::{RawPost, Repository};
use folio::markdown::{Options, Pipeline};
use folio::post::Resolver;
use folio::routes::Enumerator;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let project_arg = Arg::with_name("project")
        .long("project")
        .short("p")
        .takes_value(true)
        .value_name("DIR")
        .help("The project directory (defaults to the nearest directory containing `folio.yaml`)");

    let matches = App::new("folio")
        .about("Builds a static site from a sectioned tree of Markdown posts")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .multiple(true)
                .global(true)
                .help("Logs more detail (-v for debug, -vv for trace)"),
        )
        .subcommand(
            SubCommand::with_name("build")
                .about("Renders every post and writes the site")
                .arg(project_arg.clone())
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .value_name("DIR")
                        .help("The output directory (defaults to `_site` in the project)"),
                )
                .arg(
                    Arg::with_name("threads")
                        .long("threads")
                        .short("j")
                        .takes_value(true)
                        .value_name("N")
                        .help("The number of render threads (defaults to the CPU count)"),
                ),
        )
        .subcommand(
            SubCommand::with_name("routes")
                .about("Prints the URL of every post, one per line")
                .arg(project_arg),
        )
        .subcommand(
            SubCommand::with_name("render")
                .about("Renders one Markdown file to HTML on stdout")
                .arg(Arg::with_name("FILE").required(true).index(1)),
        )
        .get_matches();

    init_logging(matches.occurrences_of("verbose"));

    match matches.subcommand() {
        ("build", Some(m)) => build(m),
        ("routes", Some(m)) => routes(m),
        ("render", Some(m)) => render(m),
        (other, _) => Err(anyhow!("unknown subcommand `{}`", other)),
    }
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(
    m: &ArgMatches,
    output: Option<&Path>,
    threads: Option<usize>,
) -> Result<Config> {
    let dir = match m.value_of("project") {
        Some(dir) => PathBuf::from(dir),
        None => std::env::current_dir().context("Getting the working directory")?,
    };
    Config::from_directory(&dir, output, threads)
}

fn build(m: &ArgMatches) -> Result<()> {
    let threads = match m.value_of("threads") {
        Some(n) => Some(
            n.parse::<usize>()
                .with_context(|| format!("Invalid thread count `{}`", n))?,
        ),
        None => None,
    };
    let output = m.value_of("output").map(PathBuf::from);
    let config = load_config(m, output.as_deref(), threads)?;
    build_site(&config)?;
    Ok(())
}

fn routes(m: &ArgMatches) -> Result<()> {
    let config = load_config(m, None, Some(1))?;
    config.taxonomy.validate()?;
    let resolver = Resolver::new(
        Repository::new(&config.content_directory),
        Pipeline::standard(&config.markdown),
    );
    for route in Enumerator::new(&config.taxonomy, &resolver).enumerate()? {
        println!("{}", route.url(&config.base_path));
    }
    Ok(())
}

fn render(m: &ArgMatches) -> Result<()> {
    let path = m
        .value_of("FILE")
        .ok_or_else(|| anyhow!("missing FILE argument"))?;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Reading `{}`", path))?;
    let raw = RawPost::parse(&source).with_context(|| format!("Parsing `{}`", path))?;

    // Use the project's Markdown options when there is a project.
    let options = std::env::current_dir()
        .ok()
        .and_then(|dir| Config::from_directory(&dir, None, Some(1)).ok())
        .map(|config| config.markdown)
        .unwrap_or_else(Options::default);
    print!("{}", Pipeline::standard(&options).render(&raw.content));
    Ok(())
}
