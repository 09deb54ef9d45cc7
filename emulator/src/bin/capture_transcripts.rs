use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    for profile in TranscriptProfile::ALL {
        record_profile(profile)?;
    }
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    match profile {
        TranscriptProfile::Internal => record_internal(&mut session),
        TranscriptProfile::ExtBoost => record_ext_boost(&mut session),
        TranscriptProfile::Dock => record_dock(&mut session),
    }
}

fn replay(session: &mut Session, lines: &[&str]) -> io::Result<()> {
    for line in lines {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

fn record_internal(session: &mut Session) -> io::Result<()> {
    replay(
        session,
        &[
            "help",
            "vote USB charger-buck-on",
            "vote BATT charger-buck-on",
            "status",
            "withdraw USB",
            "withdraw BATT",
            "vote WLC wlc-rx",
            "vote USB-OTG otg-on",
            "withdraw USB-OTG",
            "vote TX wlc-tx",
            "status",
            "fault inject busy",
            "vote FACTORY raw=0x0c",
            "fault inject commit",
            "withdraw FACTORY",
            "status",
        ],
    )
}

fn record_ext_boost(session: &mut Session) -> io::Result<()> {
    replay(
        session,
        &[
            "vote OTG otg-on",
            "status",
            "device suspend",
            "withdraw OTG",
            "vote USB usb-buck-on",
            "device ready",
            "status",
        ],
    )
}

fn record_dock(session: &mut Session) -> io::Result<()> {
    replay(
        session,
        &[
            "vote USB charger-buck-on",
            "vote WLC wlc-rx",
            "status",
            "vote WLC-OFF wlcin-off",
            "fault inject insel",
            "withdraw WLC-OFF",
            "status",
        ],
    )
}
