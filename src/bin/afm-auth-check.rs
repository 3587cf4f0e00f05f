//! `afm-auth-check`: authenticate, show the reply, disconnect.

use std::process::ExitCode;

use afm_control_client::console;
use afm_control_client::runner::Variant;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    console::init_tracing();
    console::run(Variant::AuthOnly).await
}
