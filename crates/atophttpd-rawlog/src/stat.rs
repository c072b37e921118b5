//! Decoded sample payload: the system-wide `Sstat` and the per-task
//! `Tstat` array, plus the `Devtstat` views derived from it.
//!
//! The original rawlog format stores these as raw, fixed-layout C
//! structs from atop's `photosyst.h`/`photoproc.h`; those headers are
//! not part of this port's reference material, so the wire-level
//! payload here is this crate's own `serde`-derived encoding
//! (zlib-compressed `bincode`) rather than a byte-exact reproduction of
//! the C layout. Only the outer `RawHeader`/`RawRecord` framing (see
//! `header.rs`) follows the documented binary layout exactly. The set
//! of fields below is chosen to cover exactly the JSON keys the emitter
//! must reproduce (see `atophttpd-json`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuTotals {
    pub hertz: u64,
    pub nrcpu: u32,
    pub stime: u64,
    pub utime: u64,
    pub ntime: u64,
    pub itime: u64,
    pub wtime: u64,
    pub i_time: u64, // `Itime`
    pub s_time: u64, // `Stime`
    pub steal: u64,
    pub guest: u64,
    pub maxfreq: u64,
    pub freqcnt: u64,
    pub freqticks: u64,
    pub instr: u64,
    pub cycle: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerCpu {
    pub cpuid: u32,
    pub stime: u64,
    pub utime: u64,
    pub ntime: u64,
    pub itime: u64,
    pub wtime: u64,
    pub i_time: u64,
    pub s_time: u64,
    pub steal: u64,
    pub guest: u64,
    pub maxfreq: u64,
    pub freqcnt: u64,
    pub freqticks: u64,
    pub instr: u64,
    pub cycle: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cpl {
    pub lavg1: f64,
    pub lavg5: f64,
    pub lavg15: f64,
    pub csw: u64,
    pub devint: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Gpu {
    pub gpuid: u32,
    pub busid: String,
    pub gpu_type: String,
    pub gpupercnow: i32,
    pub mempercnow: i32,
    pub memtotnow: u64,
    pub memusenow: u64,
    pub samples: u64,
    pub gpuperccum: u64,
    pub memperccum: u64,
    pub memusecum: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mem {
    pub physmem: u64,
    pub freemem: u64,
    pub cachemem: u64,
    pub buffermem: u64,
    pub slabmem: u64,
    pub cachedrt: u64,
    pub slabreclaim: u64,
    pub vmwballoon: u64,
    pub shmem: u64,
    pub shmrss: u64,
    pub shmswp: u64,
    pub pagetables: u64,
    pub hugepagesz: u64,
    pub tothugepage: u64,
    pub freehugepage: u64,
    pub tcpsk: u64,
    pub udpsk: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Swp {
    pub totswap: u64,
    pub freeswap: u64,
    pub swcac: u64,
    pub committed: u64,
    pub commitlim: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pag {
    pub stall: u64,
    pub compacts: u64,
    pub numamigs: u64,
    pub migrates: u64,
    pub pgscans: u64,
    pub pgsteal: u64,
    pub allocstall: u64,
    pub pgins: u64,
    pub pgouts: u64,
    pub swins: u64,
    pub swouts: u64,
    pub oomkills: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Psi {
    pub present: bool,
    pub cs10: f64,
    pub cs60: f64,
    pub cs300: f64,
    pub cstot: u64,
    pub ms10: f64,
    pub ms60: f64,
    pub ms300: f64,
    pub mstot: u64,
    pub mf10: f64,
    pub mf60: f64,
    pub mf300: f64,
    pub mftot: u64,
    pub ios10: f64,
    pub ios60: f64,
    pub ios300: f64,
    pub iostot: u64,
    pub iof10: f64,
    pub iof60: f64,
    pub iof300: f64,
    pub ioftot: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceIo {
    pub name: String,
    pub io_ms: u64,
    pub nread: u64,
    pub ndiscrd: Option<u64>,
    pub nrsect: u64,
    pub nwrite: u64,
    pub nwsect: u64,
    pub avque: u64,
    pub inflight: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfsMount {
    pub mountdev: String,
    pub bytestotread: u64,
    pub bytestotwrite: u64,
    pub bytesread: u64,
    pub byteswrite: u64,
    pub bytesdread: u64,
    pub bytesdwrite: u64,
    pub pagesmread: u64,
    pub pagesmwrite: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfsClient {
    pub rpccnt: u64,
    pub rpcread: u64,
    pub rpcwrite: u64,
    pub rpcretrans: u64,
    pub rpcautrefresh: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfsServer {
    pub rpccnt: u64,
    pub rpcread: u64,
    pub rpcwrite: u64,
    pub nrbytes: u64,
    pub nwbytes: u64,
    pub rpcbadfmt: u64,
    pub rpcbadaut: u64,
    pub rpcbadcln: u64,
    pub netcnt: u64,
    pub nettcpcnt: u64,
    pub netudpcnt: u64,
    pub nettcpcon: u64,
    pub rchits: u64,
    pub rcmiss: u64,
    pub rcnocache: u64,
}

/// TCP/UDP/IP/ICMP aggregate, combined across v4+v6 the way the source
/// sums its separate protocol-family counters into one view.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetGeneral {
    pub rpackets_tcp: u64,
    pub spackets_tcp: u64,
    pub inerr_tcp: u64,
    pub oreset_tcp: u64,
    pub active_opens_tcp: u64,
    pub passive_opens_tcp: u64,
    pub retrans_segs_tcp: u64,
    pub noport_udp: u64,
    pub inerr_udp: u64,
    pub rpackets_udp: u64,
    pub spackets_udp: u64,
    pub rpackets_ip: u64,
    pub spackets_ip: u64,
    pub dpackets_ip: u64,
    pub fpackets_ip: u64,
    pub icmpi: u64,
    pub icmpo: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetInterface {
    pub name: String,
    pub rpack: u64,
    pub rbyte: u64,
    pub rerrs: u64,
    pub rdrops: u64,
    pub spack: u64,
    pub sbyte: u64,
    pub serrs: u64,
    pub sdrops: u64,
    pub speed: u32,
    pub coll: u64,
    pub multi: u64,
    pub duplex: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfinibandPort {
    pub ibname: String,
    pub portnr: u32,
    pub lanes: u32,
    pub maxrate: u64,
    pub rcvb: u64,
    pub sndb: u64,
    pub rcvp: u64,
    pub sndp: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumaMem {
    pub frag: f64,
    pub totmem: u64,
    pub freemem: u64,
    pub active: u64,
    pub inactive: u64,
    pub filepage: u64,
    pub dirtymem: u64,
    pub slabmem: u64,
    pub slabreclaim: u64,
    pub shmem: u64,
    pub tothp: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NumaCpu {
    pub numanr: u32,
    pub nrcpu: u32,
    pub stime: u64,
    pub utime: u64,
    pub ntime: u64,
    pub itime: u64,
    pub wtime: u64,
    pub i_time: u64,
    pub s_time: u64,
    pub steal: u64,
    pub guest: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Llc {
    pub id: u32,
    pub occupancy: f64,
    pub mbm_total: u64,
    pub mbm_local: u64,
}

/// System-wide statistics sample.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sstat {
    pub cpu: CpuTotals,
    pub percpu: Vec<PerCpu>,
    pub cpl: Cpl,
    pub gpu: Vec<Gpu>,
    pub mem: Mem,
    pub swp: Swp,
    pub pag: Pag,
    pub psi: Psi,
    pub lvm: Vec<DeviceIo>,
    pub mdd: Vec<DeviceIo>,
    pub dsk: Vec<DeviceIo>,
    pub nfm: Vec<NfsMount>,
    pub nfc: NfsClient,
    pub nfs: NfsServer,
    pub net_general: NetGeneral,
    pub net_interfaces: Vec<NetInterface>,
    pub ifb: Vec<InfinibandPort>,
    pub num: Vec<NumaMem>,
    pub nuc: Vec<NumaCpu>,
    pub llc: Vec<Llc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskGen {
    pub pid: u32,
    pub tgid: u32,
    pub ppid: u32,
    pub name: String,
    pub cmdline: String,
    pub isproc: bool,
    pub state: char,
    pub excode: i64,
    pub ruid: u32,
    pub rgid: u32,
    pub euid: u32,
    pub egid: u32,
    pub nthr: u32,
    pub nthrrun: u32,
    pub nthrslpi: u32,
    pub nthrslpu: u32,
    pub btime: i64,
    pub elaps: i64,
    /// Container id, empty string when the task is not containerised.
    pub container: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskCpu {
    pub utime: u64,
    pub stime: u64,
    pub nice: i32,
    pub prio: i32,
    pub curcpu: u32,
    pub rundelay: u64,
    pub blkdelay: u64,
    pub sleepavg: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMem {
    pub vmem: u64,
    pub rmem: u64,
    pub vexec: u64,
    pub vgrow: i64,
    pub rgrow: i64,
    pub minflt: u64,
    pub majflt: u64,
    pub vlibs: u64,
    pub vdata: u64,
    pub vstack: u64,
    pub vlock: u64,
    pub vswap: u64,
    pub pmem: u64,
}

impl TaskMem {
    /// Sentinel meaning "unknown"; the emitter maps it to `0`.
    pub const PMEM_UNKNOWN: u64 = u64::MAX;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskDsk {
    pub rio: u64,
    pub rsz: u64,
    pub wio: u64,
    pub wsz: u64,
    pub cwsz: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskNet {
    pub tcpsnd: u64,
    pub tcpssz: u64,
    pub tcprcv: u64,
    pub tcprsz: u64,
    pub udpsnd: u64,
    pub udpssz: u64,
    pub udprcv: u64,
    pub udprsz: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskGpu {
    pub state: char,
    pub nrgpus: u32,
    pub gpulist: u32,
    pub gpubusy: i32,
    pub membusy: i32,
    pub memnow: u64,
    pub memcum: u64,
    pub sample: u64,
}

/// A single decoded task (process or thread) row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tstat {
    pub gen: TaskGen,
    pub cpu: TaskCpu,
    pub mem: TaskMem,
    pub dsk: TaskDsk,
    pub net: TaskNet,
    pub gpu: TaskGpu,
    pub wasinactive: bool,
}

impl Tstat {
    pub fn isproc(&self) -> bool {
        self.gen.isproc
    }

    /// Thread rows that duplicate their process-leader row in the
    /// per-process groups (`PRG, PRC, PRM, PRD, PRN, PRE`).
    pub fn is_thread_duplicate(&self) -> bool {
        self.gen.tgid == self.gen.pid && !self.gen.isproc
    }
}
