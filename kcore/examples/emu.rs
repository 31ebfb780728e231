use fileblock::FileDiskEmulatorBuilder;
use kcore::alloc::SectorBitmap;
use kcore::config::{SchedulerConfig, NUM_SECTORS, SINGLE_SIZE};
use kcore::sched::{Scheduler, SimMachine, Task};
use kcore::FileHeader;

pub fn main() {
    let tmp = tempfile::tempfile().unwrap();
    let mut disk = FileDiskEmulatorBuilder::from(tmp)
        .with_sector_count(NUM_SECTORS)
        .build()
        .expect("Could not initialize disk emulator.");
    let mut free_map = SectorBitmap::new(NUM_SECTORS);

    // A file just past the single band needs two child headers.
    let mut hdr = FileHeader::new();
    hdr.allocate(&mut disk, &mut free_map, SINGLE_SIZE + 64)
        .expect("should allocate");
    hdr.print(&mut disk, &mut std::io::stdout()).unwrap();

    let mut sched = Scheduler::new(SimMachine::new(), SchedulerConfig::default(), Task::new(0, "main", 0));
    sched.spawn(Task::new(1, "editor", 120).with_burst_time(30)).unwrap();
    sched.spawn(Task::new(2, "compiler", 70)).unwrap();
    sched.spawn(Task::new(3, "backup", 10)).unwrap();
    print!("{}", sched);

    while let Some(next) = sched.find_next_to_run() {
        sched.machine_mut().advance(25);
        sched.run(next, false).unwrap();
        println!("running task {}", next);
    }
}
