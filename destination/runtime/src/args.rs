use crate::{grpc, index, k8s};
use anyhow::{bail, Result};
use clap::Parser;
use futures::StreamExt;
use index::{ClusterInfo, Index, IndexMetrics};
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "destination", about = "Linkerd Destination service")]
pub struct Args {
    #[clap(
        long,
        default_value = "linkerd=info,warn",
        env = "LINKERD_DESTINATION_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "0.0.0.0:8086")]
    grpc_addr: SocketAddr,

    #[clap(long, default_value = "cluster.local")]
    identity_domain: String,

    #[clap(long, default_value = "cluster.local")]
    cluster_domain: String,

    #[clap(long, default_value = "linkerd")]
    control_plane_namespace: String,

    /// Whether discovered endpoints may be upgraded from HTTP/1 to HTTP/2
    /// when every instance behind a service advertises support for it.
    #[clap(long, default_value_t = true)]
    enable_h2_upgrade: bool,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            grpc_addr,
            identity_domain,
            cluster_domain,
            control_plane_namespace,
            enable_h2_upgrade,
        } = self;

        let cluster_info = Arc::new(ClusterInfo {
            control_plane_ns: control_plane_namespace,
            dns_domain: cluster_domain.clone(),
            identity_domain,
        });

        let index = Index::shared(cluster_info);

        let mut prom = <Registry>::default();
        let index_metrics = IndexMetrics::register(index.clone(), &mut prom).shared();

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // Spawn the namespaced resource watches that feed the index; each
        // resource kind goes through the same `Index`, which implements
        // `kubert::index::IndexNamespacedResource` once per kind.
        let pods = runtime.watch_all::<k8s::Pod>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone(), pods).instrument(info_span!("pods")),
        );

        let services = runtime.watch_all::<k8s::api::core::v1::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone(), services)
                .instrument(info_span!("services")),
        );

        let endpoints = runtime.watch_all::<k8s::Endpoints>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone(), endpoints)
                .instrument(info_span!("endpoints")),
        );

        let servers = runtime.watch_all::<k8s::policy::Server>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone(), servers)
                .instrument(info_span!("servers")),
        );

        let server_authzs =
            runtime.watch_all::<k8s::policy::ServerAuthorization>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics.clone(), server_authzs)
                .instrument(info_span!("serverauthorizations")),
        );

        let profiles =
            runtime.watch_all::<k8s::policy::ServiceProfile>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index_metrics, profiles)
                .instrument(info_span!("serviceprofiles")),
        );

        // Nodes are cluster-scoped, so they're watched directly against the
        // index rather than through `kubert::index::namespaced`.
        tokio::spawn(
            watch_nodes(runtime.client(), index.clone()).instrument(info_span!("nodes")),
        );

        // Run the gRPC server, serving results by reading from the index.
        tokio::spawn(serve_grpc(
            grpc_addr,
            cluster_domain,
            enable_h2_upgrade,
            index,
            runtime.shutdown_handle(),
        ));

        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[tracing::instrument(skip_all, fields(port = %addr.port()))]
async fn serve_grpc(
    addr: SocketAddr,
    cluster_domain: String,
    enable_h2_upgrade: bool,
    index: index::SharedIndex,
    drain: drain::Watch,
) -> Result<()> {
    let svc = grpc::Server::new(index, cluster_domain, enable_h2_upgrade, drain.clone()).svc();

    let (close_tx, close_rx) = tokio::sync::oneshot::channel();
    tokio::pin! {
        let srv = tonic::transport::Server::builder()
            .add_service(svc)
            .serve_with_shutdown(addr, async move {
                let _ = close_rx.await;
            });
    }

    info!(%addr, "destination gRPC server listening");
    tokio::select! {
        res = (&mut srv) => res?,
        handle = drain.signaled() => {
            let _ = close_tx.send(());
            handle.release_after(srv).await?
        }
    }
    Ok(())
}

/// Watches `Node` resources outside `kubert`'s namespaced-index machinery,
/// since nodes are cluster-scoped and the index only uses them to annotate
/// discovered endpoints with a topology zone (§4.1).
async fn watch_nodes(client: k8s::Client, index: index::SharedIndex) {
    use k8s::ResourceExt;

    let api = k8s::Api::<k8s::Node>::all(client);
    let mut nodes = watcher(api, watcher::Config::default()).boxed();
    while let Some(event) = nodes.next().await {
        match event {
            Ok(k8s::WatchEvent::Applied(node)) => index.write().apply_node(node),
            Ok(k8s::WatchEvent::Deleted(node)) => index.write().delete_node(&node.name_any()),
            Ok(k8s::WatchEvent::Restarted(nodes)) => index.write().reset_nodes(nodes),
            Err(error) => tracing::warn!(%error, "node watch error"),
        }
    }
}
