use std::fs;
use std::io::{self, prelude::*};
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use tape_sort::buffer::mem::MemoryLimitedBufferBuilder;
use tape_sort::format::{self, InputFormat, OutputFormat};
use tape_sort::{
    ChunkBufferBuilder, ExternalSorter, ExternalSorterBuilder, LimitedBufferBuilder, LogObserver, Strategy,
};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let strategy: StrategyArg = arg_parser.value_of_t_or_exit("strategy");
    let input_format: InputFormatArg = arg_parser.value_of_t_or_exit("input_format");
    let output_format: OutputFormatArg = arg_parser.value_of_t_or_exit("output_format");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");

    let input = arg_parser.value_of("input").expect("value is required");
    let input_file = match fs::File::open(input) {
        Ok(file) => file,
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };
    let input_stream = match format::read_input(input_file, input_format.into()) {
        Ok(input_stream) => input_stream,
        Err(err) => {
            log::error!("input file parsing error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut output_stream = match fs::File::create(output) {
        Ok(file) => io::BufWriter::new(file),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    log::info!("sorting {} into {}", input, output);

    let result = if let Some(chunk_size) = arg_parser.value_of("chunk_size") {
        let limit = chunk_size.parse::<ByteSize>().expect("value is pre-validated").as_u64();
        log::info!("memory limit: {}", ByteSize(limit));
        run_sort(
            MemoryLimitedBufferBuilder::new(limit),
            strategy.into(),
            tmp_dir,
            input_stream,
            &mut output_stream,
            output_format.into(),
        )
    } else {
        let run_length: usize = arg_parser.value_of_t_or_exit("run_length");
        log::info!("memory limit: {} elements", run_length);
        run_sort(
            LimitedBufferBuilder::new(run_length, true),
            strategy.into(),
            tmp_dir,
            input_stream,
            &mut output_stream,
            output_format.into(),
        )
    };

    let written = match result {
        Ok(written) => written,
        Err(()) => process::exit(1),
    };

    if let Err(err) = output_stream.flush() {
        log::error!("data flushing error: {}", err);
        process::exit(1);
    }

    if written == 0 {
        log::warn!("no data processed");
    } else {
        log::info!("sorting done, {} elements saved to {}", written, output);
    }
}

/// Sorts the input into the output stream. Errors are logged here and reported as `Err(())`; the sorter and its
/// temporary directory are dropped before the function returns.
fn run_sort<B: ChunkBufferBuilder>(
    buffer_builder: B,
    strategy: Strategy,
    tmp_dir: Option<&str>,
    input_stream: format::Elements,
    output_stream: &mut impl Write,
    output_format: OutputFormat,
) -> Result<usize, ()> {
    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_buffer(buffer_builder)
        .with_strategy(strategy)
        .with_observer(LogObserver::default());

    if let Some(tmp_dir) = tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: ExternalSorter<io::Error, B> = sorter_builder.build().map_err(|err| {
        log::error!("sorter initialization error: {}", err);
    })?;

    let sorted_stream = sorter.sort(input_stream).map_err(|err| {
        log::error!("data sorting error: {}", err);
    })?;

    return format::write_output(output_stream, sorted_stream, output_format).map_err(|err| {
        log::error!("data saving error: {}", err);
    });
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum StrategyArg {
    Balanced,
    Kway,
}

impl StrategyArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for StrategyArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <StrategyArg as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<StrategyArg> for Strategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Balanced => Strategy::Balanced,
            StrategyArg::Kway => Strategy::KWay,
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum InputFormatArg {
    Auto,
    Json,
    Text,
}

impl InputFormatArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for InputFormatArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <InputFormatArg as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<InputFormatArg> for InputFormat {
    fn from(arg: InputFormatArg) -> Self {
        match arg {
            InputFormatArg::Auto => InputFormat::Auto,
            InputFormatArg::Json => InputFormat::Json,
            InputFormatArg::Text => InputFormat::Text,
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum OutputFormatArg {
    Json,
    Lines,
    Space,
}

impl OutputFormatArg {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for OutputFormatArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <OutputFormatArg as clap::ArgEnum>::from_str(s, false)
    }
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Lines => OutputFormat::Lines,
            OutputFormatArg::Space => OutputFormat::Space,
        }
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("tape-sort")
        .about("external balanced merge sorter for integers")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("strategy")
                .short('s')
                .long("strategy")
                .help("merge strategy")
                .takes_value(true)
                .default_value("balanced")
                .possible_values(StrategyArg::possible_values()),
        )
        .arg(
            clap::Arg::new("input_format")
                .short('f')
                .long("input-format")
                .help("input file format")
                .takes_value(true)
                .default_value("auto")
                .possible_values(InputFormatArg::possible_values()),
        )
        .arg(
            clap::Arg::new("output_format")
                .short('F')
                .long("output-format")
                .help("result file format")
                .takes_value(true)
                .default_value("lines")
                .possible_values(OutputFormatArg::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("memory limit of a single run")
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("run_length")
                .short('n')
                .long("run-length")
                .help("maximum number of elements in a single run")
                .takes_value(true)
                .validator(|v| match v.parse::<usize>() {
                    Ok(0) => Err(String::from("Run length must be positive")),
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Run length format incorrect: {}", err)),
                }),
        )
        .group(
            clap::ArgGroup::new("limit")
                .args(&["chunk_size", "run_length"])
                .required(true),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io;

    use rstest::*;
    use tape_sort::format::OutputFormat;
    use tape_sort::{LimitedBufferBuilder, Strategy};

    use super::run_sort;

    #[rstest]
    #[case(Strategy::Balanced)]
    #[case(Strategy::KWay)]
    fn test_run_sort(#[case] strategy: Strategy) {
        let tmp_root = tempfile::tempdir().unwrap();
        let input: Vec<io::Result<i64>> = vec![Ok(3), Ok(1), Ok(2)];
        let mut output = Vec::new();

        let result = run_sort(
            LimitedBufferBuilder::new(2, false),
            strategy,
            tmp_root.path().to_str(),
            Box::new(input.into_iter()),
            &mut output,
            OutputFormat::Space,
        );

        assert_eq!(result, Ok(3));
        assert_eq!(output, b"1 2 3");
        assert_eq!(fs::read_dir(tmp_root.path()).unwrap().count(), 0);
    }

    #[rstest]
    #[case(Strategy::Balanced)]
    #[case(Strategy::KWay)]
    fn test_failed_sort_removes_work_dir(#[case] strategy: Strategy) {
        let tmp_root = tempfile::tempdir().unwrap();
        let input: Vec<io::Result<i64>> = vec![
            Ok(3),
            Ok(1),
            Ok(2),
            Err(io::Error::new(io::ErrorKind::Other, "broken input")),
        ];
        let mut output = Vec::new();

        let result = run_sort(
            LimitedBufferBuilder::new(2, false),
            strategy,
            tmp_root.path().to_str(),
            Box::new(input.into_iter()),
            &mut output,
            OutputFormat::Lines,
        );

        assert_eq!(result, Err(()));
        assert!(output.is_empty());
        assert_eq!(fs::read_dir(tmp_root.path()).unwrap().count(), 0);
    }
}
