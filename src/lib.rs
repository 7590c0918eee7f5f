pub mod addresses;

pub mod chain;

pub mod client;

pub mod dice;

pub mod test_helpers;

pub mod ui;

pub mod wallets;
