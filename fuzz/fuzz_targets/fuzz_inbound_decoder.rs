//! Fuzz target: `decode_inbound`
//!
//! Feeds arbitrary text to the inbound message decoder.  It must never
//! panic, and a decoded config must survive trigger parsing without
//! panicking either (bad entries are errors, not crashes).
//!
//! cargo fuzz run fuzz_inbound_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinagent::app::commands::ControlCommand;
use pinagent::app::model::{Trigger, parse_actions};
use pinagent::link::codec::{InboundMessage, decode_inbound};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    match decode_inbound(text) {
        Ok(InboundMessage::Command(ControlCommand::LoadConfig(Some(config)))) => {
            for raw in &config.triggers {
                let _ = Trigger::parse(raw);
            }
        }
        Ok(InboundMessage::Command(ControlCommand::ExecuteTrigger { trigger_id, actions, .. })) => {
            assert!(!trigger_id.is_empty());
            let (parsed, skipped) = parse_actions(&actions);
            assert_eq!(parsed.len() + skipped.len(), actions.len());
        }
        _ => {}
    }
});
