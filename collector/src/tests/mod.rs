mod common;
mod polling_test;
mod router_test;
