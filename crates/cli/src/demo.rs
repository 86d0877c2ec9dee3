//! The walkthrough run by `dssctl demo`: compile, solve, then read back the
//! circuit, one bus, one element, one line and one transformer.

use clap::Args;
use dss_adapter::{BusPair, DssEngine, EngineResult, LineTable, MagAngle, PowerPair, Session};
use serde::Serialize;

#[derive(Debug, Clone, Args)]
pub struct DemoArgs {
    /// Load multiplier for the snapshot solve.
    #[arg(long, default_value_t = 1.0)]
    pub load_mult: f64,
    #[arg(long, default_value = "C")]
    pub bus: String,
    /// Full `Type.Name` of the element to inspect.
    #[arg(long, default_value = "Line.Linha1")]
    pub element: String,
    #[arg(long, default_value = "linha1")]
    pub line: String,
    /// Length written to the line before reading it back.
    #[arg(long, default_value_t = 0.4)]
    pub new_length: f64,
    #[arg(long, default_value = "trafo")]
    pub transformer: String,
}

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub engine_version: String,
    pub circuit: String,
    pub total_power: PowerPair,
    pub bus: BusReport,
    pub element: ElementReport,
    pub line: LineReport,
    pub transformer: TransformerReport,
    pub lines: LineTable,
}

#[derive(Debug, Serialize)]
pub struct BusReport {
    pub name: String,
    pub distance: f64,
    /// Line-to-line base voltage, kV.
    pub base_kv_ll: f64,
    pub voltages: Vec<MagAngle>,
}

#[derive(Debug, Serialize)]
pub struct ElementReport {
    pub name: String,
    pub buses: BusPair,
    pub voltages: Vec<MagAngle>,
    pub powers: Vec<PowerPair>,
}

#[derive(Debug, Serialize)]
pub struct LineReport {
    pub name: String,
    pub length: f64,
    pub new_length: f64,
}

#[derive(Debug, Serialize)]
pub struct TransformerReport {
    pub name: String,
    pub primary_kv: f64,
    pub secondary_kv: f64,
}

pub fn run_demo<E: DssEngine>(session: &mut Session<E>, args: &DemoArgs) -> EngineResult<DemoReport> {
    let engine_version = session.engine_version()?;

    session.compile()?;
    session.solve_snapshot(args.load_mult)?;
    let report = session.show_powers()?;
    if !report.is_empty() {
        tracing::info!(report = %report, "power report");
    }

    let circuit = session.circuit_name()?;
    let total_power = session.circuit_total_power()?;

    let bus = {
        let mut bus = session.bus(&args.bus)?;
        BusReport {
            name: bus.name().to_string(),
            distance: bus.distance()?,
            // engine reports the line-to-neutral base
            base_kv_ll: 3f64.sqrt() * bus.base_kv()?,
            voltages: bus.voltage_mag_angle()?,
        }
    };

    let element = {
        let mut el = session.element(&args.element)?;
        ElementReport {
            name: el.name().to_string(),
            buses: el.buses()?,
            voltages: el.voltage_mag_angle()?,
            powers: el.powers()?,
        }
    };

    let line = {
        let mut line = session.line(&args.line)?;
        let length = line.length()?;
        line.set_length(args.new_length)?;
        LineReport {
            name: line.name().to_string(),
            length,
            new_length: line.length()?,
        }
    };

    let transformer = {
        let mut tr = session.transformer(&args.transformer)?;
        TransformerReport {
            name: tr.name().to_string(),
            primary_kv: tr.terminal_voltage(1)?,
            secondary_kv: tr.terminal_voltage(2)?,
        }
    };

    let lines = session.enumerate_lines()?;

    Ok(DemoReport {
        engine_version,
        circuit,
        total_power,
        bus,
        element,
        line,
        transformer,
        lines,
    })
}

fn phasors(values: &[MagAngle]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| format!("{:.4}∠{:.2}°", v.magnitude, v.angle_deg))
        .collect();
    format!("[{}]", parts.join(", "))
}

fn powers(values: &[PowerPair]) -> String {
    let parts: Vec<String> = values
        .iter()
        .map(|v| format!("{:.3} + j{:.3}", v.p_kw, v.q_kvar))
        .collect();
    format!("[{}]", parts.join(", "))
}

pub fn print_report(r: &DemoReport) {
    println!("Engine version: {}", r.engine_version);
    println!();

    println!("Circuit: {}", r.circuit);
    println!("  active power:   {} kW", r.total_power.p_kw);
    println!("  reactive power: {} kvar", r.total_power.q_kvar);
    println!();

    println!("Active bus: {}", r.bus.name);
    println!("  distance from energy meter: {}", r.bus.distance);
    println!("  base voltage (kV): {}", r.bus.base_kv_ll);
    println!("  voltages (kV): {}", phasors(&r.bus.voltages));
    println!();

    println!("Active element: {}", r.element.name);
    println!(
        "  connected between buses {} and {}",
        r.element.buses.bus1, r.element.buses.bus2
    );
    println!("  nodal voltages (kV): {}", phasors(&r.element.voltages));
    println!("  powers (kW, kvar): {}", powers(&r.element.powers));
    println!();

    println!("Active line: {}", r.line.name);
    println!("  length: {}", r.line.length);
    println!("  new length: {}", r.line.new_length);
    println!();

    println!("Active transformer: {}", r.transformer.name);
    println!("  primary rated voltage (kV):   {}", r.transformer.primary_kv);
    println!("  secondary rated voltage (kV): {}", r.transformer.secondary_kv);
    println!();

    println!("Lines:");
    for (name, length) in r.lines.iter() {
        println!("  {:<16} {}", name, length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_adapter::{CircuitFixture, FixtureEngine, ModelLocator};

    const SHIPPED: &str = include_str!("../fixtures/index.yaml");

    fn default_args() -> DemoArgs {
        DemoArgs {
            load_mult: 1.0,
            bus: "C".into(),
            element: "Line.Linha1".into(),
            line: "linha1".into(),
            new_length: 0.4,
            transformer: "trafo".into(),
        }
    }

    fn session() -> Session<FixtureEngine> {
        let locator = ModelLocator::new("/models");
        let fixture = CircuitFixture::from_yaml(SHIPPED).unwrap();
        let engine = FixtureEngine::new().with_model(locator.resolve("index.dss"), fixture);
        Session::open(engine, &locator, "index.dss").unwrap()
    }

    #[test]
    fn test_demo_against_shipped_fixture() {
        let mut s = session();
        let r = run_demo(&mut s, &default_args()).unwrap();

        assert_eq!(r.circuit, "exemplo");
        assert_eq!(r.total_power, PowerPair::new(-100.4, -33.6));
        assert_eq!(r.bus.name, "C");
        assert!((r.bus.base_kv_ll - 0.22).abs() < 1e-3);
        assert_eq!(r.element.buses.bus1, "B");
        assert_eq!(r.line.length, 0.2);
        assert_eq!(r.line.new_length, 0.4);
        assert_eq!(r.transformer.primary_kv, 13.8);
        assert_eq!(r.transformer.secondary_kv, 0.22);
        assert_eq!(r.lines.names, vec!["linha1".to_string()]);
        assert_eq!(r.lines.lengths, vec![0.4]);
        assert_eq!(s.engine().load_mult(), 1.0);
    }

    #[test]
    fn test_demo_unknown_bus_fails() {
        let mut s = session();
        let args = DemoArgs {
            bus: "Z".into(),
            ..default_args()
        };
        assert!(run_demo(&mut s, &args).is_err());
    }

    #[test]
    fn test_phasor_formatting() {
        let s = phasors(&[MagAngle::new(7.967, -120.0)]);
        assert_eq!(s, "[7.9670∠-120.00°]");
    }
}
