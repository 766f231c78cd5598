use std::fs;
use std::time::Duration;

use webtrail_call::{Call, CallError, Terminal};
use webtrail_frame::{FrameConfig, Metadata};

use crate::cmd::CallArgs;
use crate::exit::{call_error, io_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{print_message, print_outcome, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let request = resolve_payload(&args)?;
    let metadata = parse_metadata(&args.metadata)?;

    let config = FrameConfig {
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
        ..FrameConfig::default()
    };
    let mut call = Call::start_with_config(&args.path, &args.method, &request, metadata, config)
        .map_err(|err| call_error("call failed to start", err))?;

    let mut received = 0usize;
    loop {
        match call.recv() {
            Ok(Some(payload)) => {
                print_message(received, &payload, format);
                received += 1;
            }
            Ok(None) => break,
            Err(CallError::Application(_)) => break,
            Err(err) => return Err(call_error("call failed", err)),
        }
    }

    // Application errors reach here with their status in the terminal;
    // only transport-class failures bailed out above.
    let terminal = call
        .terminal()
        .cloned()
        .ok_or_else(|| CliError::new(crate::exit::INTERNAL, "call ended without a terminal"))?;
    let status = terminal.status().clone();
    print_outcome(
        &status,
        received,
        call.leading_metadata(),
        call.trailing_metadata(),
        format,
    );

    match terminal {
        Terminal::Ok(_) => Ok(SUCCESS),
        _ => Ok(FAILURE),
    }
}

fn resolve_payload(args: &CallArgs) -> CliResult<Vec<u8>> {
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    serde_json::from_str::<serde_json::Value>(&args.json)
        .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
    Ok(args.json.as_bytes().to_vec())
}

fn parse_metadata(pairs: &[String]) -> CliResult<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::new(USAGE, format!("metadata must be key=value: {pair}")))?;
        if key.is_empty() {
            return Err(CliError::new(USAGE, format!("empty metadata key: {pair}")));
        }
        metadata.append(key, value);
    }
    Ok(metadata)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
