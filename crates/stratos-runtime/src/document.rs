//! Combining a declaration file with the stored document.

use shared_types::{Cluster, Ensure, ResourceDecl, ResourceKey};

/// Carry rendered outputs from `stored` into `declared`.
///
/// Resources that are stored but no longer declared are kept as `Absent`
/// declarations at the end, so the run deletes them instead of leaking
/// them. A key now declared with another kind counts as no longer
/// declared: its old object is kept under the key `<old kind>/<key>`.
pub fn merge_declared(mut declared: Cluster, stored: Option<Cluster>) -> Cluster {
    let Some(stored) = stored else {
        return declared;
    };

    let mut orphans = Vec::new();
    for mut previous in stored.resources {
        if previous.outputs.is_empty() {
            continue;
        }
        match declared.get(&previous.key).map(|decl| decl.kind == previous.kind) {
            Some(true) => {
                if let Some(decl) = declared.get_mut(&previous.key) {
                    decl.outputs = previous.outputs;
                }
                continue;
            }
            Some(false) => previous.key = orphan_key(&declared, &previous),
            None => {}
        }
        previous.ensure = Ensure::Absent;
        orphans.push(previous);
    }
    declared.resources.extend(orphans);
    declared
}

/// A key for a replaced declaration's old object that nothing else uses.
fn orphan_key(declared: &Cluster, previous: &ResourceDecl) -> ResourceKey {
    let base = format!("{}/{}", previous.kind, previous.key);
    let mut key = ResourceKey::new(base.clone());
    let mut n = 1;
    while declared.get(&key).is_some() {
        key = ResourceKey::new(format!("{}-{}", base, n));
        n += 1;
    }
    key
}

/// Drop `Absent` declarations that no longer exist anywhere.
pub fn prune_deleted(mut cluster: Cluster) -> Cluster {
    cluster
        .resources
        .retain(|decl| !(decl.is_absent() && decl.outputs.is_empty()));
    cluster
}

/// Fill identity fields the document left empty.
pub fn fill_identity(cluster: &mut Cluster, cloud_id: &str, profile: &str) {
    if cluster.cloud_id.is_empty() {
        cluster.cloud_id = cloud_id.to_string();
    }
    if cluster.profile.is_empty() {
        cluster.profile = profile.to_string();
    }
}
