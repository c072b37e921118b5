use atophttpd_output::OutputSink;
use atophttpd_rawlog::header::SupportFlags;
use atophttpd_rawlog::DecodedRecord;
use serde_json::{json, Map, Value};

use crate::derived::{clean_pmem, clean_string, exit_status, freq_and_percent};
use crate::error::{JsonError, Result};
use crate::label::{parse_selector, LABEL_ORDER};

/// Projects `record` into a label-selected JSON object and writes it to
/// `sink`. On an unknown or empty selector the short plaintext error
/// body is written instead and `Err` is returned -- the caller (the
/// HTTP front) still serves whatever landed in the sink as a 200, per
/// the source's legacy error-reporting behaviour.
pub fn emit(
    sink: &mut OutputSink,
    record: &DecodedRecord,
    selector: &str,
    hide_cmdline: bool,
    hostname: &str,
) -> Result<()> {
    let selected = match parse_selector(selector) {
        Ok(labels) => labels,
        Err(bad) => {
            let msg = format!("json lables not supported: {bad}\r\n");
            sink.append(msg.as_bytes())?;
            return Err(JsonError::UnknownLabel(bad));
        }
    };

    let mut obj = Map::new();
    obj.insert("host".into(), Value::from(hostname));
    obj.insert("timestamp".into(), Value::from(record.curtime));
    obj.insert("elapsed".into(), Value::from(record.interval));

    for &label in LABEL_ORDER {
        if !selected.contains(&label) {
            continue;
        }
        if let Some(value) = build_label(label, record, hide_cmdline) {
            obj.insert(label.to_string(), value);
        }
    }

    let body = Value::Object(obj).to_string();
    sink.append(body.as_bytes())?;
    Ok(())
}

fn build_label(label: &str, record: &DecodedRecord, hide_cmdline: bool) -> Option<Value> {
    let sstat = &record.sstat;
    match label {
        "CPU" => {
            let c = &sstat.cpu;
            let (freq, freqperc) = freq_and_percent(c.maxfreq, c.freqcnt, c.freqticks);
            Some(json!({
                "hertz": c.hertz, "nrcpu": c.nrcpu, "stime": c.stime, "utime": c.utime,
                "ntime": c.ntime, "itime": c.itime, "wtime": c.wtime, "Itime": c.i_time,
                "Stime": c.s_time, "steal": c.steal, "guest": c.guest, "freq": freq,
                "freqperc": freqperc, "instr": c.instr, "cycle": c.cycle,
            }))
        }
        "cpu" => {
            let rows: Vec<Value> = sstat
                .percpu
                .iter()
                .map(|c| {
                    let (freq, freqperc) = freq_and_percent(c.maxfreq, c.freqcnt, c.freqticks);
                    json!({
                        "cpuid": c.cpuid, "stime": c.stime, "utime": c.utime, "ntime": c.ntime,
                        "itime": c.itime, "wtime": c.wtime, "Itime": c.i_time, "Stime": c.s_time,
                        "steal": c.steal, "guest": c.guest, "freq": freq, "freqperc": freqperc,
                        "instr": c.instr, "cycle": c.cycle,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "CPL" => {
            let cpl = &sstat.cpl;
            Some(json!({
                "lavg1": format_args!("{:.2}", cpl.lavg1).to_string(),
                "lavg5": format_args!("{:.2}", cpl.lavg5).to_string(),
                "lavg15": format_args!("{:.2}", cpl.lavg15).to_string(),
                "csw": cpl.csw, "devint": cpl.devint,
            }))
        }
        "GPU" => {
            let rows: Vec<Value> = sstat
                .gpu
                .iter()
                .map(|g| {
                    json!({
                        "gpuid": g.gpuid, "busid": g.busid, "type": g.gpu_type,
                        "gpupercnow": g.gpupercnow, "mempercnow": g.mempercnow,
                        "memtotnow": g.memtotnow, "memusenow": g.memusenow, "samples": g.samples,
                        "gpuperccum": g.gpuperccum, "memperccum": g.memperccum,
                        "memusecum": g.memusecum,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "MEM" => {
            let m = &sstat.mem;
            Some(json!({
                "physmem": m.physmem, "freemem": m.freemem, "cachemem": m.cachemem,
                "buffermem": m.buffermem, "slabmem": m.slabmem, "cachedrt": m.cachedrt,
                "slabreclaim": m.slabreclaim, "vmwballoon": m.vmwballoon, "shmem": m.shmem,
                "shmrss": m.shmrss, "shmswp": m.shmswp, "pagetables": m.pagetables,
                "hugepagesz": m.hugepagesz, "tothugepage": m.tothugepage,
                "freehugepage": m.freehugepage, "tcpsk": m.tcpsk, "udpsk": m.udpsk,
            }))
        }
        "SWP" => {
            let s = &sstat.swp;
            Some(json!({
                "totswap": s.totswap, "freeswap": s.freeswap, "swcac": s.swcac,
                "committed": s.committed, "commitlim": s.commitlim,
            }))
        }
        "PAG" => {
            let p = &sstat.pag;
            Some(json!({
                "stall": p.stall, "compacts": p.compacts, "numamigs": p.numamigs,
                "migrates": p.migrates, "pgscans": p.pgscans, "pgsteal": p.pgsteal,
                "allocstall": p.allocstall, "pgins": p.pgins, "pgouts": p.pgouts,
                "swins": p.swins, "swouts": p.swouts, "oomkills": p.oomkills,
            }))
        }
        "PSI" => {
            let psi = &sstat.psi;
            if !psi.present {
                return None;
            }
            Some(json!({
                "psi": "y", "cs10": psi.cs10, "cs60": psi.cs60, "cs300": psi.cs300,
                "cstot": psi.cstot, "ms10": psi.ms10, "ms60": psi.ms60, "ms300": psi.ms300,
                "mstot": psi.mstot, "mf10": psi.mf10, "mf60": psi.mf60, "mf300": psi.mf300,
                "mftot": psi.mftot, "ios10": psi.ios10, "ios60": psi.ios60, "ios300": psi.ios300,
                "iostot": psi.iostot, "iof10": psi.iof10, "iof60": psi.iof60, "iof300": psi.iof300,
                "ioftot": psi.ioftot,
            }))
        }
        "LVM" => Some(device_rows(&sstat.lvm, "lvmname", DiscardPos::BeforeNrsect)),
        "MDD" => Some(device_rows(&sstat.mdd, "mddname", DiscardPos::None)),
        "DSK" => Some(device_rows(&sstat.dsk, "dskname", DiscardPos::AfterNrsect)),
        "NFM" => {
            let rows: Vec<Value> = sstat
                .nfm
                .iter()
                .map(|m| {
                    json!({
                        "mountdev": m.mountdev, "bytestotread": m.bytestotread,
                        "bytestotwrite": m.bytestotwrite, "bytesread": m.bytesread,
                        "byteswrite": m.byteswrite, "bytesdread": m.bytesdread,
                        "bytesdwrite": m.bytesdwrite, "pagesmread": m.pagesmread,
                        "pagesmwrite": m.pagesmwrite,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "NFC" => {
            let c = &sstat.nfc;
            Some(json!({
                "rpccnt": c.rpccnt, "rpcread": c.rpcread, "rpcwrite": c.rpcwrite,
                "rpcretrans": c.rpcretrans, "rpcautrefresh": c.rpcautrefresh,
            }))
        }
        "NFS" => {
            let s = &sstat.nfs;
            Some(json!({
                "rpccnt": s.rpccnt, "rpcread": s.rpcread, "rpcwrite": s.rpcwrite,
                "nrbytes": s.nrbytes, "nwbytes": s.nwbytes, "rpcbadfmt": s.rpcbadfmt,
                "rpcbadaut": s.rpcbadaut, "rpcbadcln": s.rpcbadcln, "netcnt": s.netcnt,
                "nettcpcnt": s.nettcpcnt, "netudpcnt": s.netudpcnt, "nettcpcon": s.nettcpcon,
                "rchits": s.rchits, "rcmiss": s.rcmiss, "rcnocache": s.rcnocache,
            }))
        }
        "NET" => {
            let g = &sstat.net_general;
            let interfaces: Vec<Value> = sstat
                .net_interfaces
                .iter()
                .map(|n| {
                    json!({
                        "name": n.name, "rpack": n.rpack, "rbyte": n.rbyte, "rerrs": n.rerrs,
                        "rdrops": n.rdrops, "spack": n.spack, "sbyte": n.sbyte,
                        "serrs": n.serrs, "sdrops": n.sdrops, "speed": n.speed,
                        "coll": n.coll, "multi": n.multi, "duplex": n.duplex,
                    })
                })
                .collect();
            Some(json!({
                "NET_GENERAL": {
                    "rpacketsTCP": g.rpackets_tcp, "spacketsTCP": g.spackets_tcp,
                    "inerrTCP": g.inerr_tcp, "oresetTCP": g.oreset_tcp,
                    "activeOpensTCP": g.active_opens_tcp, "passiveOpensTCP": g.passive_opens_tcp,
                    "retransSegsTCP": g.retrans_segs_tcp, "noportUDP": g.noport_udp,
                    "inerrUDP": g.inerr_udp, "rpacketsUDP": g.rpackets_udp,
                    "spacketsUDP": g.spackets_udp, "rpacketsIP": g.rpackets_ip,
                    "spacketsIP": g.spackets_ip, "dpacketsIP": g.dpackets_ip,
                    "fpacketsIP": g.fpackets_ip, "icmpi": g.icmpi, "icmpo": g.icmpo,
                },
                "intf": interfaces,
            }))
        }
        "IFB" => {
            let rows: Vec<Value> = sstat
                .ifb
                .iter()
                .map(|p| {
                    json!({
                        "ibname": p.ibname, "portnr": p.portnr, "lanes": p.lanes,
                        "maxrate": p.maxrate, "rcvb": p.rcvb, "sndb": p.sndb,
                        "rcvp": p.rcvp, "sndp": p.sndp,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "NUM" => {
            let rows: Vec<Value> = sstat
                .num
                .iter()
                .map(|n| {
                    json!({
                        "frag": n.frag, "totmem": n.totmem, "freemem": n.freemem,
                        "active": n.active, "inactive": n.inactive, "filepage": n.filepage,
                        "dirtymem": n.dirtymem, "slabmem": n.slabmem,
                        "slabreclaim": n.slabreclaim, "shmem": n.shmem, "tothp": n.tothp,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "NUC" => {
            let rows: Vec<Value> = sstat
                .nuc
                .iter()
                .map(|n| {
                    json!({
                        "numanr": n.numanr, "nrcpu": n.nrcpu, "stime": n.stime,
                        "utime": n.utime, "ntime": n.ntime, "itime": n.itime,
                        "wtime": n.wtime, "Itime": n.i_time, "Stime": n.s_time,
                        "steal": n.steal, "guest": n.guest,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "LLC" => {
            let rows: Vec<Value> = sstat
                .llc
                .iter()
                .map(|l| {
                    json!({
                        "LLC": l.id, "occupancy": l.occupancy, "mbm_total": l.mbm_total,
                        "mbm_local": l.mbm_local,
                    })
                })
                .collect();
            Some(Value::Array(rows))
        }
        "PRG" => Some(process_rows(record, |t| {
            let (status, exitcode) = exit_status(t.gen.excode);
            json!({
                "pid": t.gen.pid,
                "name": format!("({})", clean_string(&t.gen.name)),
                "state": t.gen.state.to_string(),
                "ruid": t.gen.ruid, "rgid": t.gen.rgid, "tgid": t.gen.tgid,
                "nthr": t.gen.nthr, "st": status, "exitcode": exitcode,
                "btime": t.gen.btime,
                "cmdline": format!("({})", cmdline(t, hide_cmdline)),
                "ppid": t.gen.ppid, "nthrrun": t.gen.nthrrun,
                "nthrslpi": t.gen.nthrslpi, "nthrslpu": t.gen.nthrslpu,
                "euid": t.gen.euid, "egid": t.gen.egid, "elaps": t.gen.elaps,
                "isproc": t.gen.isproc,
                "cid": if t.gen.container.is_empty() { "-".to_string() } else { t.gen.container.clone() },
            })
        })),
        "PRC" => Some(process_rows(record, |t| {
            json!({
                "pid": t.gen.pid, "utime": t.cpu.utime, "stime": t.cpu.stime,
                "nice": t.cpu.nice, "prio": t.cpu.prio, "curcpu": t.cpu.curcpu,
                "tgid": t.gen.tgid, "isproc": t.gen.isproc,
                "rundelay": t.cpu.rundelay, "blkdelay": t.cpu.blkdelay,
                "sleepavg": t.cpu.sleepavg,
            })
        })),
        "PRM" => Some(process_rows(record, |t| {
            json!({
                "pid": t.gen.pid, "vmem": t.mem.vmem, "rmem": t.mem.rmem,
                "vexec": t.mem.vexec, "vgrow": t.mem.vgrow, "rgrow": t.mem.rgrow,
                "minflt": t.mem.minflt, "majflt": t.mem.majflt, "vlibs": t.mem.vlibs,
                "vdata": t.mem.vdata, "vstack": t.mem.vstack, "vlock": t.mem.vlock,
                "vswap": t.mem.vswap, "pmem": clean_pmem(t.mem.pmem),
            })
        })),
        "PRD" => Some(process_rows(record, |t| {
            json!({
                "pid": t.gen.pid, "rio": t.dsk.rio, "rsz": t.dsk.rsz,
                "wio": t.dsk.wio, "wsz": t.dsk.wsz, "cwsz": t.dsk.cwsz,
            })
        })),
        "PRN" => {
            if !record.flags.contains(SupportFlags::NETATOP) {
                return None;
            }
            Some(process_rows(record, |t| {
                json!({
                    "pid": t.gen.pid, "tcpsnd": t.net.tcpsnd, "tcpssz": t.net.tcpssz,
                    "tcprcv": t.net.tcprcv, "tcprsz": t.net.tcprsz,
                    "udpsnd": t.net.udpsnd, "udpssz": t.net.udpssz,
                    "udprcv": t.net.udprcv, "udprsz": t.net.udprsz,
                })
            }))
        }
        "PRE" => {
            if !record.flags.contains(SupportFlags::GPUSTAT) {
                return None;
            }
            Some(process_rows(record, |t| {
                let gpustate = if t.gpu.state == '\0' { 'N' } else { t.gpu.state };
                json!({
                    "pid": t.gen.pid, "gpustate": gpustate.to_string(),
                    "nrgpus": t.gpu.nrgpus, "gpulist": format!("{:x}", t.gpu.gpulist),
                    "gpubusy": t.gpu.gpubusy, "membusy": t.gpu.membusy,
                    "memnow": t.gpu.memnow, "memcum": t.gpu.memcum, "sample": t.gpu.sample,
                })
            }))
        }
        _ => None,
    }
}

/// `LVM`/`DSK` carry a `ndiscrd` counter that `MDD` devices don't; its
/// position within the object differs between the two groups.
enum DiscardPos {
    None,
    BeforeNrsect,
    AfterNrsect,
}

fn device_rows(devices: &[atophttpd_rawlog::stat::DeviceIo], name_key: &str, discard: DiscardPos) -> Value {
    let rows: Vec<Value> = devices
        .iter()
        .map(|d| {
            let mut row = Map::new();
            row.insert(name_key.into(), Value::from(d.name.as_str()));
            row.insert("io_ms".into(), Value::from(d.io_ms));
            row.insert("nread".into(), Value::from(d.nread));
            if matches!(discard, DiscardPos::BeforeNrsect) {
                row.insert("ndiscrd".into(), Value::from(d.ndiscrd.unwrap_or(0)));
            }
            row.insert("nrsect".into(), Value::from(d.nrsect));
            if matches!(discard, DiscardPos::AfterNrsect) {
                row.insert("ndiscrd".into(), Value::from(d.ndiscrd.unwrap_or(0)));
            }
            row.insert("nwrite".into(), Value::from(d.nwrite));
            row.insert("nwsect".into(), Value::from(d.nwsect));
            row.insert("avque".into(), Value::from(d.avque));
            row.insert("inflight".into(), Value::from(d.inflight));
            Value::Object(row)
        })
        .collect();
    Value::Array(rows)
}

fn cmdline(t: &atophttpd_rawlog::stat::Tstat, hide_cmdline: bool) -> String {
    if hide_cmdline {
        "***".to_string()
    } else {
        clean_string(&t.gen.cmdline)
    }
}

/// Builds one process-group array over every task (process leaders and
/// their threads alike), skipping only the thread-duplicate row a
/// leader's own thread entry produces (`tgid == pid && !isproc`).
/// Iterating `procall` instead would already have filtered out every
/// non-leader thread, making that skip a no-op and silently dropping
/// every other thread row the original emits per process.
fn process_rows<F>(record: &DecodedRecord, mut f: F) -> Value
where
    F: FnMut(&atophttpd_rawlog::stat::Tstat) -> Value,
{
    let rows: Vec<Value> = record
        .devtstat
        .taskall
        .iter()
        .filter(|t| !t.is_thread_duplicate())
        .map(|t| f(t))
        .collect();
    Value::Array(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atophttpd_rawlog::devtstat::Devtstat;
    use atophttpd_rawlog::stat::{Sstat, TaskGen, Tstat};

    fn record(flags: SupportFlags) -> DecodedRecord {
        let tasks = vec![
            Tstat {
                gen: TaskGen {
                    pid: 10,
                    tgid: 10,
                    name: "init".into(),
                    isproc: true,
                    ..Default::default()
                },
                ..Default::default()
            },
            Tstat {
                gen: TaskGen {
                    pid: 11,
                    tgid: 10,
                    name: "init".into(),
                    isproc: false,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        DecodedRecord {
            flags,
            curtime: 101,
            interval: 10,
            sstat: Sstat::default(),
            devtstat: Devtstat::new(tasks, 1, 1, 0, 0, 0),
        }
    }

    #[test]
    fn unknown_label_writes_error_body_and_errs() {
        let mut sink = OutputSink::buffer();
        let rec = record(SupportFlags::empty());
        let err = emit(&mut sink, &rec, "FOO", false, "host").unwrap_err();
        assert!(matches!(err, JsonError::UnknownLabel(ref l) if l == "FOO"));
        let body = String::from_utf8(sink.as_bytes().to_vec()).unwrap();
        assert!(body.contains("json lables not supported: FOO"));
    }

    #[test]
    fn selected_labels_appear_in_table_order_regardless_of_selector_order() {
        let mut sink = OutputSink::buffer();
        let rec = record(SupportFlags::empty());
        emit(&mut sink, &rec, "MEM,CPU", false, "myhost").unwrap();
        let body = String::from_utf8(sink.as_bytes().to_vec()).unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();
        let keys: Vec<&str> = parsed.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["host", "timestamp", "elapsed", "CPU", "MEM"]);
        assert_eq!(parsed["host"], "myhost");
        assert_eq!(parsed["timestamp"], 101);
    }

    #[test]
    fn prn_is_only_emitted_when_netatop_flag_set() {
        let mut sink = OutputSink::buffer();
        let rec = record(SupportFlags::empty());
        emit(&mut sink, &rec, "PRN", false, "host").unwrap();
        let body: Value = serde_json::from_str(&String::from_utf8(sink.as_bytes().to_vec()).unwrap()).unwrap();
        assert!(body.as_object().unwrap().get("PRN").is_none());

        let mut sink = OutputSink::buffer();
        let rec = record(SupportFlags::NETATOP);
        emit(&mut sink, &rec, "PRN", false, "host").unwrap();
        let body: Value = serde_json::from_str(&String::from_utf8(sink.as_bytes().to_vec()).unwrap()).unwrap();
        assert!(body.as_object().unwrap().get("PRN").is_some());
    }

    #[test]
    fn prg_skips_thread_duplicate_rows() {
        let mut sink = OutputSink::buffer();
        let rec = record(SupportFlags::empty());
        emit(&mut sink, &rec, "PRG", false, "host").unwrap();
        let body: Value = serde_json::from_str(&String::from_utf8(sink.as_bytes().to_vec()).unwrap()).unwrap();
        let rows = body["PRG"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pid"], 10);
    }

    #[test]
    fn hide_cmdline_replaces_every_cmdline_with_placeholder() {
        let mut sink = OutputSink::buffer();
        let mut rec = record(SupportFlags::empty());
        rec.devtstat.taskall[0].gen.cmdline = "/usr/bin/real --flag".into();
        emit(&mut sink, &rec, "PRG", true, "host").unwrap();
        let body: Value = serde_json::from_str(&String::from_utf8(sink.as_bytes().to_vec()).unwrap()).unwrap();
        assert_eq!(body["PRG"][0]["cmdline"], "(***)");
    }
}
