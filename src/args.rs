use clap::Parser;

/// This is a provincial team quota allocation program.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the allocation batch: the input sources,
    /// the allocation rules and the output settings. For more information about the
    /// file format, read the documentation.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference CSV file containing published quotas. If provided, provquota will
    /// check that the first computed allocation matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (directory path or empty) If specified, the allocation tables will be written to this
    /// directory. Setting this option overrides the path that may be specified with the
    /// --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
