//! End-to-end tests of the probe engine over a simulated network.

#[cfg(test)]
mod sim;

#[cfg(test)]
mod trace {
    mod integration;
}
