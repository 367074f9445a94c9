//! Output formatting shared by the replay and project commands.

use console::style;
use geoanchor::projection::Placement;
use geoanchor::session::{RenderPlacement, SessionEvent};

/// One table row for a placement.
pub fn format_placement(placement: &RenderPlacement) -> String {
    let offset = placement.placement.offset();
    let mut line = format!(
        "{:<16} right {:>+8.2} m  forward {:>+8.2} m  rot {:>6.1}°  dist {:>7.2} m  scale {:.2}  {}",
        placement.id.as_str(),
        offset.right,
        offset.forward,
        offset.rotation_degrees,
        offset.distance_meters,
        placement.scale,
        placement.model_reference,
    );
    if offset.clamped {
        line.push_str("  (clamped)");
    }
    if let Placement::Degraded { reason, .. } = &placement.placement {
        line.push_str(&format!("  [directly ahead: {}]", reason));
    }
    line
}

/// Print a placement table.
pub fn print_placements(placements: &[RenderPlacement]) {
    for placement in placements {
        if placement.placement.is_degraded() {
            println!("  {}", style(format_placement(placement)).yellow());
        } else {
            println!("  {}", format_placement(placement));
        }
    }
}

/// Print one session event as it arrives.
pub fn print_event(event: &SessionEvent) {
    let kind = event.kind();
    match event {
        SessionEvent::VisibilityChanged { entered, exited } => {
            for e in entered {
                println!(
                    "{} {} ({:.1} m)",
                    style("+ entered").green().bold(),
                    e.object.id,
                    e.distance_meters
                );
            }
            for id in exited {
                println!("{} {}", style("- exited ").red().bold(), id);
            }
        }
        SessionEvent::Placements(placements) => {
            println!("{}", style(format!("{} visible", placements.len())).dim());
            print_placements(placements);
        }
        _ if kind.is_problem() => {
            println!("{} {}", style(format!("[{}]", kind)).yellow(), event);
        }
        _ => println!("{}", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoanchor::catalog::AnchorId;
    use geoanchor::projection::{DegradedReason, LocalOffset};

    fn offset() -> LocalOffset {
        LocalOffset {
            right: 1.5,
            forward: -3.25,
            rotation_degrees: 270.0,
            distance_meters: 3.58,
            clamped: false,
        }
    }

    #[test]
    fn test_format_anchored_placement() {
        let placement = RenderPlacement {
            id: AnchorId::new("bench"),
            model_reference: "bench.glb".to_string(),
            scale: 1.0,
            placement: Placement::Anchored(offset()),
        };
        let line = format_placement(&placement);
        assert!(line.starts_with("bench"));
        assert!(line.contains("+1.50"));
        assert!(line.contains("-3.25"));
        assert!(line.contains("bench.glb"));
        assert!(!line.contains("directly ahead"));
    }

    #[test]
    fn test_format_degraded_placement() {
        let placement = RenderPlacement {
            id: AnchorId::new("bench"),
            model_reference: "bench.glb".to_string(),
            scale: 2.0,
            placement: Placement::Degraded {
                offset: offset(),
                reason: DegradedReason::MissingHeading,
            },
        };
        let line = format_placement(&placement);
        assert!(line.contains("directly ahead"));
        assert!(line.contains("scale 2.00"));
    }
}
