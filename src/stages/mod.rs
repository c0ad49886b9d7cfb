pub mod stage1_analyze;
pub mod stage2_filter;
pub mod stage3_verify;
pub mod stage4_select;
pub mod stage5_recover;
pub mod stage6_script;
pub mod stage7_gate;
pub mod stage8_rebuttal;
pub mod stage9_validate;

pub use stage1_analyze::*;
pub use stage2_filter::*;
pub use stage3_verify::*;
pub use stage4_select::*;
pub use stage5_recover::*;
pub use stage6_script::*;
pub use stage7_gate::*;
pub use stage8_rebuttal::*;
pub use stage9_validate::*;
