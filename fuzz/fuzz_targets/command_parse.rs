#![no_main]

use libfuzzer_sys::fuzz_target;
use pmbot_discord::{parse_bot_command, BotCommand};

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    match parse_bot_command(&raw, "!") {
        Some(BotCommand::Invalid { message }) => assert!(!message.trim().is_empty()),
        Some(command) => assert!(raw.trim_start().starts_with('!') && !command.name().is_empty()),
        None => {}
    }
});
