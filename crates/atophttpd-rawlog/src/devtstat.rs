use crate::stat::Tstat;

/// Derived view over one decoded `tstat` buffer: three overlapping
/// slices (all tasks, process leaders only, active process leaders
/// only) expressed as index sets into the single owning `Vec<Tstat>`.
/// The source holds these as three raw pointer arrays; this port ties
/// each view's lifetime to the owning buffer via borrow-checked index
/// slices instead.
pub struct Devtstat {
    pub taskall: Vec<Tstat>,
    procall_idx: Vec<usize>,
    procactive_idx: Vec<usize>,
    pub ntaskactive: u32,
    pub totrun: u32,
    pub totslpi: u32,
    pub totslpu: u32,
    pub totzombie: u32,
}

impl Devtstat {
    pub fn new(
        taskall: Vec<Tstat>,
        ntaskactive: u32,
        totrun: u32,
        totslpi: u32,
        totslpu: u32,
        totzombie: u32,
    ) -> Self {
        let procall_idx: Vec<usize> = taskall
            .iter()
            .enumerate()
            .filter(|(_, t)| t.isproc())
            .map(|(i, _)| i)
            .collect();

        let procactive_idx: Vec<usize> = procall_idx
            .iter()
            .copied()
            .filter(|&i| !taskall[i].wasinactive)
            .collect();

        Devtstat {
            taskall,
            procall_idx,
            procactive_idx,
            ntaskactive,
            totrun,
            totslpi,
            totslpu,
            totzombie,
        }
    }

    pub fn procall(&self) -> impl Iterator<Item = &Tstat> {
        self.procall_idx.iter().map(move |&i| &self.taskall[i])
    }

    pub fn procactive(&self) -> impl Iterator<Item = &Tstat> {
        self.procactive_idx.iter().map(move |&i| &self.taskall[i])
    }

    pub fn totproc(&self) -> usize {
        self.procall_idx.len()
    }

    pub fn nactproc(&self) -> usize {
        self.procactive_idx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stat::TaskGen;

    fn task(pid: u32, isproc: bool, wasinactive: bool) -> Tstat {
        Tstat {
            gen: TaskGen {
                pid,
                tgid: pid,
                isproc,
                ..Default::default()
            },
            wasinactive,
            ..Default::default()
        }
    }

    #[test]
    fn views_partition_taskall_without_copying() {
        let tasks = vec![
            task(1, true, false),
            task(2, false, false),
            task(3, true, true),
        ];
        let dt = Devtstat::new(tasks, 3, 1, 1, 0, 0);
        assert_eq!(dt.taskall.len(), 3);
        assert_eq!(dt.totproc(), 2);
        assert_eq!(dt.nactproc(), 1);
        let active: Vec<u32> = dt.procactive().map(|t| t.gen.pid).collect();
        assert_eq!(active, vec![1]);
    }
}
