//! `afm-connection-test`: authenticate, run one `APIEcho` exchange, wait for
//! the operator, disconnect.

use std::process::ExitCode;

use afm_control_client::console;
use afm_control_client::runner::Variant;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    console::init_tracing();
    console::run(Variant::EchoTest).await
}
