mod scan_sessions;
mod scans;
