use std::cell::{Cell, RefCell};
use std::fs;
use std::rc::Rc;
use std::time::Duration;

use scriptwire_channel::{connect_with_config, Channel, ChannelConfig, Reply};
use scriptwire_transport::UdsConnection;

use crate::cmd::EvalArgs;
use crate::exit::{channel_error, io_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_reply, OutputFormat, ReplyOutput};

pub fn run(args: EvalArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    let config = ChannelConfig {
        open_timeout: timeout,
        ..ChannelConfig::default()
    };

    if let Some(path) = &args.file {
        let script = fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        let mut channel = connect_with_config(&args.path, config)
            .map_err(|err| channel_error("connect failed", err))?;
        let label = path.display().to_string();
        return run_application_script(&mut channel, script, &label, format, timeout);
    }

    let script = args.script.unwrap_or_default();
    let mut channel = connect_with_config(&args.path, config)
        .map_err(|err| channel_error("connect failed", err))?;

    let slot: Rc<RefCell<Option<Reply>>> = Rc::default();
    let sink = Rc::clone(&slot);
    channel
        .submit(script, move |reply| *sink.borrow_mut() = Some(reply))
        .map_err(|err| channel_error("submit failed", err))?;
    channel
        .wait_for_replies(timeout)
        .map_err(|err| channel_error("no reply", err))?;

    let reply = slot
        .borrow_mut()
        .take()
        .ok_or_else(|| CliError::new(FAILURE, "no reply"))?;
    let value = reply.map_err(|err| channel_error("reply rejected", err))?;

    print_reply(&ReplyOutput::new("eval", value.as_ref(), channel.stats()), format);
    channel.reset();
    Ok(SUCCESS)
}

fn run_application_script(
    channel: &mut Channel<UdsConnection>,
    script: Vec<u8>,
    label: &str,
    format: OutputFormat,
    timeout: Duration,
) -> CliResult<i32> {
    let done = Rc::new(Cell::new(false));
    let flag = Rc::clone(&done);
    channel
        .execute_application_script(script, move || flag.set(true))
        .map_err(|err| channel_error("submit failed", err))?;
    channel
        .wait_for_replies(timeout)
        .map_err(|err| channel_error("application script did not finish", err))?;

    if !done.get() {
        return Err(CliError::new(FAILURE, "application script did not finish"));
    }
    tracing::info!(script = label, "application script done");

    print_reply(&ReplyOutput::new(label, None, channel.stats()), format);
    channel.reset();
    Ok(SUCCESS)
}
