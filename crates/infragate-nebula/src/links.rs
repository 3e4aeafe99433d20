//! Helpers shared by the networkinterface and storagelink adapters

use crate::backend::{Shared, settled};
use crate::record::VmRecord;
use infragate_core::{BackendError, RequestContext, Result};
use std::future::Future;

/// Extracts the numeric ID from a link end such as `/compute/42`,
/// checking that it points into one of `terms`
pub fn link_end(location: &str, terms: &[&str]) -> Result<String> {
    let mut segments = location.trim_end_matches('/').rsplit('/');
    let id = segments.next().unwrap_or_default();
    let term = segments.next().unwrap_or_default();

    if !terms.contains(&term) || id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BackendError::ResourceNotValid(format!(
            "link end {:?} does not point to a {} resource",
            location,
            terms.join(" or ")
        )));
    }
    Ok(id.to_string())
}

/// Runs a hotplug operation and waits for the VM to settle.
///
/// `done` is checked on the settled VM; a VM that settles without the change
/// applied fails with `Remote(failure)`.
pub async fn hotplug<F, D>(
    shared: &Shared,
    vm_id: &str,
    operation: F,
    done: D,
    failure: &str,
    cx: &RequestContext,
) -> Result<VmRecord>
where
    F: Future<Output = Result<()>>,
    D: FnOnce(&VmRecord) -> bool,
{
    operation.await?;

    shared
        .wait_for_vm(
            vm_id,
            &settled(),
            |vm| {
                if done(vm) {
                    return Ok(());
                }
                if let Some(detail) = vm.user_error() {
                    tracing::error!("VM {} reported: {}", vm_id, detail);
                }
                Err(BackendError::Remote(failure.to_string()))
            },
            cx,
        )
        .await
}
