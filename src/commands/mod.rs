// ABOUTME: Command module aggregator for the edgeswap CLI.
// ABOUTME: Re-exports bootstrap, run, status, purge, route, and orphans handlers.

mod bootstrap;
mod orphans;
mod purge;
mod route;
mod run;
mod status;
mod workspace;

pub use bootstrap::bootstrap;
pub use orphans::orphans;
pub use purge::purge;
pub use route::route;
pub use run::run;
pub use status::status;
