use crate::cancel::CancelToken;
use crate::error::TopUpResult;
use async_trait::async_trait;

/// A caller-supplied step that runs after the wallet is back on the destination
/// chain. Steps run in registration order and are numbered from 6.
#[async_trait]
pub trait AdditionalStep: Send + Sync {
    fn label(&self) -> &str;

    async fn run(&self, cancel: &CancelToken) -> TopUpResult<()>;
}
