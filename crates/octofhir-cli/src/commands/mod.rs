pub mod launch;
pub mod resources;
pub mod restricted;
pub mod run;
