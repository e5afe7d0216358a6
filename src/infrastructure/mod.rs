//! External engine adapters

mod docker;

pub use docker::DockerCli;
