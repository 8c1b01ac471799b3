//! End-to-end tests: sequential mining and block relay between live nodes

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use minichain::config::Config;
use minichain::consensus::{BlockOrigin, ChainState};
use minichain::core::pow::{self, SearchOutcome};
use minichain::core::{Block, Target, INITIAL_DIFFICULTY};
use minichain::net::protocol::{self, Message};
use minichain::node::Node;

/// Poll `check` until it returns true or the timeout elapses
async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Duration::from_secs(10);
    let poll = Duration::from_millis(20);
    let result = tokio::time::timeout(deadline, async {
        while !check().await {
            tokio::time::sleep(poll).await;
        }
    })
    .await;
    result.unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}

/// Mine one block on the current tip of `chain`
fn mine_next(chain: &ChainState, payload: &[u8]) -> Block {
    let template = chain.build_template(payload.to_vec());
    match pow::search(&template, || false).unwrap() {
        SearchOutcome::Found(found) => template.seal(found.nonce),
        SearchOutcome::Interrupted => unreachable!(),
    }
}

/// Config for a test node: ephemeral port, no background mining
fn quiet_node(peers: Vec<String>) -> Config {
    let mut config = Config::default();
    config.network.port = 0;
    config.network.peers = peers;
    config.mining.enabled = false;
    config
}

/// Loopback dial address for a running node
fn addr_of(node: &Node) -> String {
    format!("127.0.0.1:{}", node.local_addr().port())
}

#[test]
fn test_mine_five_blocks_sequentially() {
    let chain = ChainState::new(Duration::from_secs(10)).unwrap();
    assert_eq!(chain.tip().difficulty, INITIAL_DIFFICULTY);

    for i in 0..5u8 {
        let block = mine_next(&chain, &[i]);

        // The search starts at zero, so the sealed nonce must be the least
        // qualifying one
        let target = Target::from_difficulty(block.difficulty).unwrap();
        let template = minichain::core::BlockTemplate {
            previous_hash: block.previous_hash,
            payload: block.payload.clone(),
            timestamp: block.timestamp,
            difficulty: block.difficulty,
        };
        for nonce in 0..block.nonce {
            assert!(!target.is_met_by(&template.hash_with_nonce(nonce)));
        }

        chain.try_append(block, BlockOrigin::Local).unwrap();
    }

    assert_eq!(chain.height(), 6);
    let blocks = chain.snapshot();
    for pair in blocks.windows(2) {
        assert_eq!(pair[1].previous_hash, pair[0].hash);
    }
    assert!(blocks.iter().all(pow::verify));
}

#[tokio::test]
async fn test_block_relays_between_two_nodes() {
    let receiver = Node::start(quiet_node(Vec::new())).await.unwrap();
    let sender = Node::start(quiet_node(vec![addr_of(&receiver)]))
        .await
        .unwrap();

    // Wait for the dial to land on both sides before producing the block
    wait_until("peer connection", || async {
        receiver.peer_count() == 1 && sender.peer_count() == 1
    })
    .await;

    let block = mine_next(&sender.chain(), b"relay me");
    sender
        .chain()
        .try_append(block.clone(), BlockOrigin::Local)
        .unwrap();

    let receiver_chain = receiver.chain();
    wait_until("block relay", || {
        let chain = Arc::clone(&receiver_chain);
        let hash = block.hash;
        async move { chain.tip().hash == hash }
    })
    .await;

    assert_eq!(receiver.chain().tip().hash, sender.chain().tip().hash);
    assert_eq!(receiver.chain().height(), 2);

    sender.shutdown().await;
    receiver.shutdown().await;
}

#[tokio::test]
async fn test_relay_floods_past_the_middle_node() {
    // a -> b <- c: blocks accepted by b are forwarded to everyone but the
    // block's own origin, so a block from a reaches c through b
    let b = Node::start(quiet_node(Vec::new())).await.unwrap();
    let a = Node::start(quiet_node(vec![addr_of(&b)]))
        .await
        .unwrap();
    let c = Node::start(quiet_node(vec![addr_of(&b)]))
        .await
        .unwrap();

    wait_until("full topology", || async {
        b.peer_count() == 2 && a.peer_count() == 1 && c.peer_count() == 1
    })
    .await;

    let block = mine_next(&a.chain(), b"flood");
    a.chain()
        .try_append(block.clone(), BlockOrigin::Local)
        .unwrap();

    for node in [&b, &c] {
        let chain = node.chain();
        wait_until("relay to every node", || {
            let chain = Arc::clone(&chain);
            let hash = block.hash;
            async move { chain.tip().hash == hash }
        })
        .await;
    }

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn test_fresh_node_bootstraps_from_peer_chain() {
    // Grow a chain on the serving node first
    let server = Node::start(quiet_node(Vec::new())).await.unwrap();
    for i in 0..3u8 {
        let block = mine_next(&server.chain(), &[i]);
        server
            .chain()
            .try_append(block, BlockOrigin::Local)
            .unwrap();
    }
    assert_eq!(server.chain().height(), 4);

    // A fresh node dials in and requests the chain on connect
    let fresh = Node::start(quiet_node(vec![addr_of(&server)]))
        .await
        .unwrap();

    let fresh_chain = fresh.chain();
    wait_until("bootstrap adoption", || {
        let chain = Arc::clone(&fresh_chain);
        async move { chain.height() == 4 }
    })
    .await;
    assert_eq!(fresh.chain().tip().hash, server.chain().tip().hash);
    assert_eq!(fresh.chain().genesis(), server.chain().genesis());

    fresh.shutdown().await;
    server.shutdown().await;
}

#[tokio::test]
async fn test_invalid_peer_block_is_dropped_without_disconnect() {
    let victim = Node::start(quiet_node(Vec::new())).await.unwrap();

    // Speak the wire protocol directly so invalid blocks actually hit the
    // connection (a real node would never broadcast one)
    let stream = tokio::net::TcpStream::connect(addr_of(&victim))
        .await
        .unwrap();
    let mut framed = protocol::framed(stream);
    wait_until("peer connection", || async { victim.peer_count() == 1 }).await;

    // Genesis is deterministic, so a mirror chain mines blocks the victim
    // sees as extending its own tip
    let mirror = ChainState::new(Duration::from_secs(10)).unwrap();
    let mut forged = mine_next(&mirror, b"forged");
    forged.nonce ^= 1;
    framed
        .send(Message::NewBlock { block: forged }.encode().unwrap())
        .await
        .unwrap();

    // A good block afterwards still flows over the same connection
    let good = mine_next(&mirror, b"good");
    framed
        .send(
            Message::NewBlock {
                block: good.clone(),
            }
            .encode()
            .unwrap(),
        )
        .await
        .unwrap();

    let victim_chain = victim.chain();
    wait_until("good block accepted", || {
        let chain = Arc::clone(&victim_chain);
        let hash = good.hash;
        async move { chain.tip().hash == hash }
    })
    .await;
    assert_eq!(victim.chain().height(), 2);
    assert_eq!(victim.peer_count(), 1);

    victim.shutdown().await;
}
