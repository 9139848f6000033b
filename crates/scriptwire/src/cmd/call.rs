use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use scriptwire_channel::{connect_with_config, ChannelConfig, Reply};
use serde_json::Value;

use crate::cmd::CallArgs;
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_reply, OutputFormat, ReplyOutput};

pub fn run(args: CallArgs, format: OutputFormat, timeout: Duration) -> CliResult<i32> {
    let call_args = parse_args(&args.args)?;
    let config = ChannelConfig {
        bridge_object: args.bridge.clone(),
        open_timeout: timeout,
        ..ChannelConfig::default()
    };
    let mut channel = connect_with_config(&args.path, config)
        .map_err(|err| channel_error("connect failed", err))?;

    let slot: Rc<RefCell<Option<Reply>>> = Rc::default();
    let sink = Rc::clone(&slot);
    channel
        .call_remote_method(&args.method, &call_args, move |reply| {
            *sink.borrow_mut() = Some(reply);
        })
        .map_err(|err| channel_error("call failed", err))?;
    channel
        .wait_for_replies(timeout)
        .map_err(|err| channel_error("no reply", err))?;

    let reply = slot
        .borrow_mut()
        .take()
        .ok_or_else(|| CliError::new(crate::exit::FAILURE, "no reply"))?;
    let value = reply.map_err(|err| channel_error("reply rejected", err))?;

    let out = ReplyOutput::new(&args.method, value.as_ref(), channel.stats());
    print_reply(&out, format);
    channel.reset();
    Ok(SUCCESS)
}

fn parse_args(raw: &[String]) -> CliResult<Vec<Value>> {
    raw.iter()
        .map(|arg| {
            serde_json::from_str(arg)
                .map_err(|err| CliError::new(USAGE, format!("--arg {arg:?} is not valid JSON: {err}")))
        })
        .collect()
}
