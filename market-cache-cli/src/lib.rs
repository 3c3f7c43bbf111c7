pub mod input;
pub mod report;

pub use input::{collect_params, parse_param, read_payload, ttl_from_hours, PayloadFormat};
pub use report::{render_event, render_gate_status, render_policies, render_stats};
