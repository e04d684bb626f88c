//! 剧本：内置脚本目录与逐步回放的执行器

pub mod runner;
pub mod script;

pub use runner::ScenarioRunner;
pub use script::{Action, Scenario, Step};
