mod discovery;
mod policy;
mod provisioning;
mod support;
mod teardown;
