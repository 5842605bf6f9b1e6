#[macro_use]
extern crate serde_derive;

pub mod farm;
pub mod utils;
pub mod window;

#[cfg(test)]
mod test;
