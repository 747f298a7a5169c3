//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements   | Connects to                 |
//! |-------------|--------------|-----------------------------|
//! | `sim_gpio`  | PinBackend   | In-memory simulated lines   |
//! | `sysfs_gpio`| PinBackend   | Linux `/sys/class/gpio`     |
//! | `http`      | HttpPort     | `reqwest` blocking client   |
//! | `log_sink`  | EventSink    | Log output                  |
//! | `time`      | Clock        | System local time           |
//! | `identity`  | (none)       | Hostname / routing table    |

pub mod http;
pub mod identity;
pub mod log_sink;
pub mod sim_gpio;
pub mod sysfs_gpio;
pub mod time;
