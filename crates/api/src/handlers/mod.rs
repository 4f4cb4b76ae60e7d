pub mod channels;
pub mod coords;
pub mod map;
pub mod situations;
pub mod units;
