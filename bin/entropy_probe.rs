//! Consumes randomness through every entry point the preload library shadows
//! and prints what it got as hex, one result per line.
//!
//! This binary deliberately does not link `detrand`; the integration tests
//! run it with and without `LD_PRELOAD`.

use std::env;
use std::ffi::CString;
use std::process::exit;

const USAGE: &str = "usage: entropy-probe <command> [arguments...]

commands:
  device <path> <n>        read n bytes from a device with open/read
  dup <n>                  read n bytes from a dup of /dev/urandom
  file <path>              print a file's bytes, or the open/read errno
  reuse <path>             fdopen+fclose /dev/urandom, then print a file
                           that is likely to reuse the descriptor number
  pread <n>                pread n bytes from /dev/urandom at offset 0
  readv <n>...             one readv of /dev/urandom, one vector per size
  getrandom <n>...         one getrandom call per size, concatenated
  getentropy <n>           one getentropy call
  syscall <n>              syscall(SYS_getrandom) for n bytes
  rand <count>             count values from rand()
  random <count>           count values from random() after srandom(time)
  threads <threads> <n>    each thread calls getrandom once for n bytes";

unsafe extern "C" {
    fn getentropy(buf: *mut libc::c_void, buflen: libc::size_t) -> libc::c_int;
    fn random() -> libc::c_long;
    fn srandom(seed: libc::c_uint);
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn number(arg: Option<&String>) -> usize {
    match arg.and_then(|a| a.parse().ok()) {
        Some(n) => n,
        None => {
            eprintln!("{}", USAGE);
            exit(2);
        }
    }
}

fn open_path(path: &str) -> Result<i32, i32> {
    let c_path = CString::new(path).map_err(|_| libc::EINVAL)?;
    let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_RDONLY) };
    if fd < 0 { Err(errno()) } else { Ok(fd) }
}

/// Read until `n` bytes or end of file.
fn read_exact(fd: i32, n: usize) -> Result<Vec<u8>, i32> {
    let mut buf = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        let ret = unsafe { libc::read(fd, buf[filled..].as_mut_ptr().cast(), n - filled) };
        match ret {
            r if r < 0 => return Err(errno()),
            0 => break,
            r => filled += r as usize,
        }
    }
    buf.truncate(filled);
    Ok(buf)
}

fn device(path: &str, n: usize) -> Result<String, i32> {
    let fd = open_path(path)?;
    let bytes = read_exact(fd, n);
    unsafe { libc::close(fd) };
    Ok(hex(&bytes?))
}

fn dup(n: usize) -> Result<String, i32> {
    let fd = open_path("/dev/urandom")?;
    let copy = unsafe { libc::dup(fd) };
    unsafe { libc::close(fd) };
    if copy < 0 {
        return Err(errno());
    }
    let bytes = read_exact(copy, n);
    unsafe { libc::close(copy) };
    Ok(hex(&bytes?))
}

fn file(path: &str) -> String {
    let result = open_path(path).and_then(|fd| {
        let bytes = read_exact(fd, 1 << 20);
        unsafe { libc::close(fd) };
        bytes
    });
    match result {
        Ok(bytes) => hex(&bytes),
        Err(errno) => format!("errno {}", errno),
    }
}

/// Release a device descriptor through stdio, which skips `close`.
fn reuse(path: &str) -> Result<String, i32> {
    let fd = open_path("/dev/urandom")?;
    let stream = unsafe { libc::fdopen(fd, c"r".as_ptr()) };
    if stream.is_null() {
        return Err(errno());
    }
    unsafe { libc::fclose(stream) };
    Ok(file(path))
}

fn pread(n: usize) -> Result<String, i32> {
    let fd = open_path("/dev/urandom")?;
    let mut buf = vec![0u8; n];
    let ret = unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), n, 0) };
    let err = errno();
    unsafe { libc::close(fd) };
    if ret < 0 {
        return Err(err);
    }
    buf.truncate(ret as usize);
    Ok(hex(&buf))
}

fn readv(sizes: &[usize]) -> Result<String, i32> {
    let fd = open_path("/dev/urandom")?;
    let mut bufs: Vec<Vec<u8>> = sizes.iter().map(|&n| vec![0u8; n]).collect();
    let iov: Vec<libc::iovec> = bufs
        .iter_mut()
        .map(|buf| libc::iovec {
            iov_base: buf.as_mut_ptr().cast(),
            iov_len: buf.len(),
        })
        .collect();
    let ret = unsafe { libc::readv(fd, iov.as_ptr(), iov.len() as libc::c_int) };
    let err = errno();
    unsafe { libc::close(fd) };
    if ret < 0 {
        return Err(err);
    }
    let mut out = bufs.concat();
    out.truncate(ret as usize);
    Ok(hex(&out))
}

fn getrandom(n: usize) -> Result<Vec<u8>, i32> {
    let mut buf = vec![0u8; n];
    let ret = unsafe { libc::getrandom(buf.as_mut_ptr().cast(), n, 0) };
    if ret < 0 {
        return Err(errno());
    }
    buf.truncate(ret as usize);
    Ok(buf)
}

fn run(args: &[String]) -> Result<(), i32> {
    let command = args.first().map(String::as_str).unwrap_or("");
    match command {
        "device" => {
            let path = args.get(1).cloned().unwrap_or_default();
            println!("{}", device(&path, number(args.get(2)))?);
        }
        "dup" => println!("{}", dup(number(args.get(1)))?),
        "file" => println!("{}", file(args.get(1).map(String::as_str).unwrap_or(""))),
        "reuse" => println!("{}", reuse(args.get(1).map(String::as_str).unwrap_or(""))?),
        "pread" => println!("{}", pread(number(args.get(1)))?),
        "readv" => {
            let sizes: Vec<usize> = args[1..].iter().map(|arg| number(Some(arg))).collect();
            println!("{}", readv(&sizes)?);
        }
        "getrandom" => {
            let mut out = Vec::new();
            for arg in &args[1..] {
                out.extend(getrandom(number(Some(arg)))?);
            }
            println!("{}", hex(&out));
        }
        "getentropy" => {
            let mut buf = vec![0u8; number(args.get(1))];
            if unsafe { getentropy(buf.as_mut_ptr().cast(), buf.len()) } != 0 {
                return Err(errno());
            }
            println!("{}", hex(&buf));
        }
        "syscall" => {
            let mut buf = vec![0u8; number(args.get(1))];
            let ret = unsafe {
                libc::syscall(libc::SYS_getrandom, buf.as_mut_ptr(), buf.len(), 0)
            };
            if ret < 0 {
                return Err(errno());
            }
            println!("{}", hex(&buf));
        }
        "rand" => {
            let values: Vec<String> = (0..number(args.get(1)))
                .map(|_| unsafe { libc::rand() }.to_string())
                .collect();
            println!("{}", values.join(" "));
        }
        "random" => {
            let now = unsafe { libc::time(std::ptr::null_mut()) };
            unsafe { srandom(now as libc::c_uint ^ std::process::id()) };
            let values: Vec<String> = (0..number(args.get(1)))
                .map(|_| unsafe { random() }.to_string())
                .collect();
            println!("{}", values.join(" "));
        }
        "threads" => {
            let threads = number(args.get(1));
            let n = number(args.get(2));
            let handles: Vec<_> = (0..threads)
                .map(|_| std::thread::spawn(move || getrandom(n)))
                .collect();
            for handle in handles {
                let bytes = handle.join().unwrap_or(Err(0))?;
                println!("{}", hex(&bytes));
            }
        }
        _ => {
            eprintln!("{}", USAGE);
            exit(2);
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(errno) = run(&args) {
        eprintln!("entropy-probe: errno {}", errno);
        exit(1);
    }
}
