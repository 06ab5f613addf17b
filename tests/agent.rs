//! End-to-end behavior of the command socket over the assembled device tree

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use cwmp_agent::config::{Settings, StatsFormat, WlanSettings};
use cwmp_agent::device::build_tree;
use cwmp_agent::protocol::{BlockOutcome, Dispatcher, Server};
use cwmp_agent::surface::{ControlSurface, RecordingSurface};
use cwmp_agent::tree::{ConfigurableObject, Resolved, Tree};
use cwmp_agent::wifi::{WlanConfig, WlanConfiguration};

const WLAN: &str = "InternetGatewayDevice.LANDevice.1.WLANConfiguration.1.";
const WLAN2: &str = "InternetGatewayDevice.LANDevice.1.WLANConfiguration.2.";

/// `wl` commands a fully enabled radio commits with, in order
const COMMIT_ORDER: [&str; 13] = [
    "radio on",
    "down",
    "band b",
    "ap 1",
    "bss down",
    "channel 6",
    "up",
    "ssid home",
    "rmwep 0",
    "addwep 1 abcde",
    "rmwep 2",
    "rmwep 3",
    "primary_key 1",
];

fn settings(stats_dir: &Path) -> Settings {
    Settings {
        autochannel_sleep_secs: 0,
        stats_format: StatsFormat::KeyValue,
        stats_path: stats_dir.join("stats.{ifname}"),
        ..Default::default()
    }
}

fn agent(settings: &Settings) -> Result<(Dispatcher, RecordingSurface)> {
    let surface = RecordingSurface::new();
    let handle = surface.clone();
    let tree = build_tree(settings, move |_| -> Arc<dyn ControlSurface> {
        Arc::new(handle.clone())
    })?;
    Ok((Dispatcher::new(tree), surface))
}

fn block(dispatcher: &mut Dispatcher, lines: &[String]) -> Vec<Vec<String>> {
    match dispatcher.process_lines(lines) {
        BlockOutcome::Reply(records) => records,
        other => panic!("unexpected outcome {:?}", other),
    }
}

fn row(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn radio_at<'t>(tree: &'t Tree, path: &str) -> &'t WlanConfiguration {
    match tree.resolve(path) {
        Ok(Resolved::Object(id)) => tree
            .downcast_ref::<WlanConfiguration>(id)
            .expect("radio object"),
        other => panic!("radio not found: {:?}", other.is_ok()),
    }
}

fn radio(tree: &Tree) -> WlanConfig {
    radio_at(tree, WLAN).config().clone()
}

/// `expected` appears in `calls` in this order, possibly with gaps
fn assert_in_order(calls: &[String], expected: &[&str]) {
    let mut rest = calls.iter();
    for want in expected {
        assert!(
            rest.any(|call| call == want),
            "{:?} missing or out of order in {:?}",
            want,
            calls
        );
    }
}

#[tokio::test]
async fn test_failed_block_leaves_radio_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut dispatcher, surface) = agent(&settings(dir.path()))?;
    let before = radio(dispatcher.tree());

    let records = block(
        &mut dispatcher,
        &[
            format!("set {}Channel 6", WLAN),
            format!("set {}SSID {}", WLAN, "x".repeat(33)),
        ],
    );
    assert_eq!(records.len(), 1);
    assert_eq!(records[0][0], "ERROR");
    assert_eq!(records[0][1], "9007");

    assert_eq!(radio(dispatcher.tree()), before);
    assert!(surface.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_get_inside_block_reads_hardware() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut dispatcher, surface) = agent(&settings(dir.path()))?;
    surface.respond("channel", "current mac channel\t11\ntarget channel\t11\n");

    let channel = format!("{}Channel", WLAN);
    let records = block(
        &mut dispatcher,
        &[format!("set {} 6", channel), format!("get {}", channel)],
    );
    assert_eq!(
        records,
        vec![row(&["OK"]), row(&[&channel, "6"]), row(&[&channel, "11"])]
    );
    assert_eq!(radio(dispatcher.tree()).channel, Some(6));
    Ok(())
}

#[tokio::test]
async fn test_commit_drives_wl_in_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut dispatcher, surface) = agent(&settings(dir.path()))?;

    let records = block(
        &mut dispatcher,
        &[
            format!("set {}Enable true {}Channel 6", WLAN, WLAN),
            format!("set {}SSID home", WLAN),
            format!("set {}WEPKey.2.WEPKey abcde", WLAN),
        ],
    );
    assert_eq!(records[0], row(&["OK"]));

    let calls = surface.calls();
    assert_in_order(&calls, &COMMIT_ORDER);
    assert_eq!(calls.iter().filter(|c| *c == "radio on").count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_commit_order_ignores_write_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut dispatcher, surface) = agent(&settings(dir.path()))?;

    let records = block(
        &mut dispatcher,
        &[
            format!("set {}WEPKey.2.WEPKey abcde", WLAN),
            format!("set {}SSID home", WLAN),
            format!("set {}Channel 6", WLAN),
            format!("set {}Enable true", WLAN),
        ],
    );
    assert_eq!(records[0], row(&["OK"]));

    let calls = surface.calls();
    assert_in_order(&calls, &COMMIT_ORDER);
    assert_eq!(calls.iter().filter(|c| *c == "radio on").count(), 1);
    Ok(())
}

#[tokio::test]
async fn test_hardware_failure_keeps_commit_and_other_radios() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut settings = settings(dir.path());
    settings.wlan = ["wl0", "wl1"]
        .into_iter()
        .map(|ifname| WlanSettings {
            ifname: ifname.to_string(),
        })
        .collect();
    let first = RecordingSurface::new();
    let second = RecordingSurface::new();
    first.fail("channel 6");
    let (a, b) = (first.clone(), second.clone());
    let tree = build_tree(&settings, move |ifname| -> Arc<dyn ControlSurface> {
        if ifname == "wl0" {
            Arc::new(a.clone())
        } else {
            Arc::new(b.clone())
        }
    })?;
    let mut dispatcher = Dispatcher::new(tree);

    let records = block(
        &mut dispatcher,
        &[
            format!("set {}Enable true {}Channel 6", WLAN, WLAN),
            format!("set {}Enable true {}Channel 11", WLAN2, WLAN2),
        ],
    );
    assert_eq!(records.len(), 1);
    assert_eq!(&records[0][..2], &["ERROR", "9002"]);

    // No rollback: the working copy stays committed
    let failed = radio_at(dispatcher.tree(), WLAN);
    assert_eq!(failed.config().channel, Some(6));
    assert!(!failed.in_transaction());
    assert!(first.calls().contains(&"channel 6".to_string()));

    let other = radio_at(dispatcher.tree(), WLAN2);
    assert_eq!(other.config().channel, Some(11));
    assert!(!other.in_transaction());
    assert_in_order(&second.calls(), &["radio on", "ap 1", "channel 11", "up"]);
    Ok(())
}

#[tokio::test]
async fn test_counters_survive_wraparound() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut settings = settings(dir.path());
    settings.counter_bits = 8;
    let stats = dir.path().join("stats.wlan0");
    let (mut dispatcher, _surface) = agent(&settings)?;

    let bytes_sent = format!("{}Stats.BytesSent", WLAN);
    std::fs::write(&stats, "tx_bytes 250\n")?;
    let records = block(
        &mut dispatcher,
        &[format!("get {}", bytes_sent), format!("get {}", bytes_sent)],
    );
    assert_eq!(records[1], row(&[&bytes_sent, "250"]));
    assert_eq!(records[2], row(&[&bytes_sent, "250"]));

    std::fs::write(&stats, "tx_bytes 10\n")?;
    let records = block(&mut dispatcher, &[format!("get {}", bytes_sent)]);
    assert_eq!(records[1], row(&[&bytes_sent, "266"]));
    Ok(())
}

#[tokio::test]
async fn test_tree_commands() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (mut dispatcher, _surface) = agent(&settings(dir.path()))?;

    let records = block(&mut dispatcher, &["list InternetGatewayDevice.".to_string()]);
    assert_eq!(
        records,
        vec![
            row(&["OK"]),
            row(&["InternetGatewayDevice.DeviceInfo."]),
            row(&["InternetGatewayDevice.LANDevice."]),
        ]
    );

    let records = block(&mut dispatcher, &[format!("completions {}WEPK", WLAN)]);
    assert!(records.contains(&vec![format!("{}WEPKey.", WLAN)]));
    assert!(records.contains(&vec![format!("{}WEPKeyIndex", WLAN)]));

    let records = block(&mut dispatcher, &["help".to_string()]);
    assert_eq!(records.len(), 15);
    assert_eq!(records[1][0], "add");

    let records = block(
        &mut dispatcher,
        &["add InternetGatewayDevice.LANDevice.1.WLANConfiguration".to_string()],
    );
    assert_eq!(records[0][0], "ERROR");

    let records = block(&mut dispatcher, &["validate".to_string()]);
    assert_eq!(records, vec![row(&["OK"])]);

    let records = block(&mut dispatcher, &["frobnicate".to_string()]);
    assert_eq!(&records[0][..2], &["ERROR", "9000"]);
    Ok(())
}

async fn exchange(server: &Server, request: &str) -> Result<String> {
    let (mut client, remote) = tokio::io::duplex(64 * 1024);
    let server = server.clone();
    let task = tokio::spawn(async move { server.handle_connection(remote).await });
    client.write_all(request.as_bytes()).await?;
    client.shutdown().await?;
    let mut out = String::new();
    client.read_to_string(&mut out).await?;
    task.await??;
    Ok(out)
}

/// Read one reply block, up to and including its empty line
async fn read_reply(client: &mut DuplexStream) -> Result<String> {
    let mut out = Vec::new();
    let mut byte = [0u8; 1];
    while !out.ends_with(b"\n\n") {
        if client.read(&mut byte).await? == 0 {
            break;
        }
        out.push(byte[0]);
    }
    Ok(String::from_utf8(out)?)
}

#[tokio::test]
async fn test_quit_closes_only_its_connection() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (dispatcher, _surface) = agent(&settings(dir.path()))?;
    let server = Server::new(dispatcher);

    // This connection stays open while another one quits
    let (mut other, remote) = tokio::io::duplex(64 * 1024);
    let other_task = {
        let server = server.clone();
        tokio::spawn(async move { server.handle_connection(remote).await })
    };
    other.write_all(format!("get {}Name\n\n", WLAN).as_bytes()).await?;
    assert_eq!(read_reply(&mut other).await?, format!("OK\n{}Name wlan0\n\n", WLAN));

    let out = exchange(&server, &format!("set {}SSID guest\nquit\nget {}Name\n\n", WLAN, WLAN)).await?;
    assert_eq!(out, "");

    other.write_all(format!("get {}Name\n\n", WLAN).as_bytes()).await?;
    assert_eq!(read_reply(&mut other).await?, format!("OK\n{}Name wlan0\n\n", WLAN));
    other.shutdown().await?;
    let mut rest = String::new();
    other.read_to_string(&mut rest).await?;
    assert_eq!(rest, "");
    other_task.await??;

    let dispatcher = server.dispatcher();
    let dispatcher = dispatcher.lock().await;
    assert_eq!(radio(dispatcher.tree()).ssid.as_deref(), Some("guest"));
    Ok(())
}
