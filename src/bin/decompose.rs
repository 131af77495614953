/// Decompose spectral photon-counting measurements into material line integrals

// ----------------------------------- CLI -----------------------------------
use clap::Parser;
use std::path::PathBuf;

use kedge::utils::parse_list;
use units::Length;

// Alias to disable clap's `Vec` magic: the whole list is one argument
type Lengths = Vec<Length>;

#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "decompose", about = "Maximum-likelihood material decomposition of spectral counts")]
pub struct Cli {

    /// TOML file with optimizer settings and calibration tables
    #[clap(short, long, default_value = "decompose-config.toml")]
    pub config: PathBuf,

    /// Prefix of output files: `<PREFIX>_<material>_{thickness,precision}.raw`
    #[clap(short, long, default_value = "data/out/decomposed")]
    pub out: String,

    #[cfg(not(feature = "serial"))]
    /// Maximum number of rayon threads
    #[clap(short = 'j', long, default_value = "4")]
    pub threads: usize,

    #[clap(subcommand)]
    pub source: Source,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Source {

    /// Decompose measured counts read from raw f32 images
    Measured {
        /// Counts image: one plane per spectral bin
        #[clap(short = 'f', long)]
        counts: PathBuf,

        /// Initial guess image: one plane per material
        #[clap(long)]
        initial_guess_image: Option<PathBuf>,

        /// Initial guess used for every pixel, if no image is given, e.g. `1 cm,10 mm` [default: 1 cm for each material]
        #[clap(short = 'g', long, value_parser = parse_list::<Length>)]
        initial_guess: Option<Lengths>,

        /// Incident spectrum image, for spatially varying spectra: one plane per energy sample
        #[clap(long)]
        spectrum: Option<PathBuf>,
    },

    /// Decompose a simulated uniform phantom
    Simulate {
        /// True thickness of each material, e.g. `1.5 cm,3 cm`
        #[clap(short, long, value_parser = parse_list::<Length>)]
        thicknesses: Lengths,

        /// Number of pixels
        #[clap(short = 'n', long, default_value = "10000")]
        pixels: usize,

        /// Initial guess used for every pixel [default: 1 cm for each material]
        #[clap(short = 'g', long, value_parser = parse_list::<Length>)]
        initial_guess: Option<Lengths>,

        /// Use the expected counts, without Poisson noise
        #[clap(long)]
        noiseless: bool,

        /// Seed of the Poisson noise
        #[clap(long, default_value = "0")]
        seed: u64,
    },
}
// --------------------------------------------------------------------------------

use std::error::Error;
use std::fs::create_dir_all;
use std::path::Path;

use log::info;
use rand::{SeedableRng, rngs::StdRng};
use units::cm_;

use kedge::{
    Calibration, CalibrationError, Config, Decomposer, PixelInput, PixelResult, Thicknesses,
    batch::{pixel_progress_bar, pixel_values, process_all, Summary},
    config::decompose::read_config_file,
    io::raw,
    simulate::{uniform_phantom, Noise},
    utils::{group_digits, timing::Progress},
};

fn main() -> Result<(), Box<dyn Error>> {

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Cli::parse();
    let mut progress = Progress::new();

    progress.start("Reading configuration");
    let config = read_config_file(&args.config)?;
    let shape = config.calibration.shape()?;
    progress.done();
    info!("{} materials, {} bins, {} energies", shape.materials, shape.bins, shape.energies);

    // If the directory where results will be written does not exist yet, make it
    if let Some(dir) = Path::new(&format!("{}_", args.out)).parent() {
        create_dir_all(dir)?;
    }

    #[cfg(not(feature = "serial"))]
    rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global()?;

    // Only shapes listed here are compiled
    macro_rules! dispatch {
        ($(($m:literal, $b:literal, $e:literal)),+ $(,)?) => {
            match (shape.materials, shape.bins, shape.energies) {
                $(($m, $b, $e) => run::<$m, $b, $e>(&args, &config, progress),)+
                (materials, bins, energies) => Err(CalibrationError::UnsupportedShape { materials, bins, energies }.into()),
            }
        };
    }
    dispatch!(
        (1, 1,   1),
        (2, 2,   3),
        (2, 4,   8),
        (3, 4,   8),
        (2, 6, 150),
        (3, 6, 150),
    )
}

fn run<const M: usize, const B: usize, const E: usize>(args: &Cli, config: &Config, mut progress: Progress) -> Result<(), Box<dyn Error>> {
    let calibration = config.calibration.build::<M, B, E>()?;

    progress.start("Preparing pixels");
    let inputs = match &args.source {
        Source::Measured { counts, initial_guess_image, initial_guess, spectrum } => {
            let guess = constant_guess::<M>(initial_guess)?;
            read_pixels(counts, initial_guess_image.as_deref(), guess, spectrum.as_deref())?
        },
        Source::Simulate { thicknesses, pixels, initial_guess, noiseless, seed } => {
            let truth = thicknesses_from(thicknesses)?;
            let guess = constant_guess::<M>(initial_guess)?;
            let noise = if *noiseless { Noise::None } else { Noise::Poisson };
            let mut rng = StdRng::seed_from_u64(*seed);
            let inputs = uniform_phantom(&calibration, &truth, &guess, *pixels, noise, &mut rng);
            let counts = inputs.iter().map(|pixel| pixel.counts).collect::<Vec<_>>();
            raw::write_planes(&counts, &PathBuf::from(format!("{}_counts.raw", args.out)))?;
            inputs
        },
    };
    progress.done_with_message(&format!("Prepared {} pixels", group_digits(inputs.len())));

    progress.startln("Decomposing");
    let results = decompose_all(&calibration, config, &inputs);
    progress.done_with_message("Decomposed");

    let summary = Summary::of(&results);
    summary.log();

    progress.start("Writing images");
    write_images(&results, &config.calibration.material_names(), &args.out)?;
    progress.done();
    Ok(())
}

fn decompose_all<const M: usize, const B: usize, const E: usize>(
    calibration: &Calibration<M, B, E>,
    config     : &Config,
    inputs     : &[PixelInput<M, B, E>],
) -> Vec<PixelResult<M>> {
    let decomposer = Decomposer::new(calibration, config.optimizer)
        .with_degeneracy_tolerance(config.degeneracy_tolerance);
    let bar = pixel_progress_bar(inputs.len());
    process_all(&decomposer, inputs, Some(&bar))
}

/// Attenuation tables are per cm, so the decomposition works in cm
fn thicknesses_from<const M: usize>(values: &[Length]) -> Result<Thicknesses<M>, Box<dyn Error>> {
    if values.len() != M {
        return Err(format!("expected {M} thicknesses (one per material), got {}", values.len()).into())
    }
    Ok(Thicknesses::<M>::from_iterator(values.iter().copied().map(cm_)))
}

fn constant_guess<const M: usize>(values: &Option<Lengths>) -> Result<Thicknesses<M>, Box<dyn Error>> {
    match values {
        Some(values) => thicknesses_from(values),
        None         => Ok(Thicknesses::<M>::from_element(1.0)),
    }
}

fn read_pixels<const M: usize, const B: usize, const E: usize>(
    counts       : &Path,
    guess_image  : Option<&Path>,
    guess        : Thicknesses<M>,
    spectrum     : Option<&Path>,
) -> Result<Vec<PixelInput<M, B, E>>, Box<dyn Error>> {
    let counts = raw::read_planes::<B>(counts)?;
    let n_pixels = counts.len();
    let check = |what: &str, n: usize| -> Result<(), Box<dyn Error>> {
        if n == n_pixels { Ok(()) }
        else { Err(format!("{what} image has {n} pixels, but counts image has {n_pixels}").into()) }
    };

    let guesses = match guess_image {
        Some(path) => raw::read_planes::<M>(path)?,
        None       => vec![guess; n_pixels],
    };
    check("initial guess", guesses.len())?;

    let spectra = match spectrum {
        Some(path) => Some(raw::read_planes::<E>(path)?),
        None       => None,
    };
    if let Some(spectra) = &spectra { check("spectrum", spectra.len())? }

    Ok(counts.into_iter()
       .zip(guesses)
       .enumerate()
       .map(|(p, (counts, guess))| {
           let pixel = PixelInput::new(counts, guess);
           match &spectra {
               Some(spectra) => pixel.with_spectrum(spectra[p]),
               None          => pixel,
           }
       })
       .collect())
}

fn write_images<const M: usize>(results: &[PixelResult<M>], names: &[String], out: &str) -> std::io::Result<()> {
    let (thicknesses, precisions): (Vec<_>, Vec<_>) = results.iter().map(pixel_values).unzip();
    for (m, name) in names.iter().enumerate().take(M) {
        let path = PathBuf::from(format!("{out}_{name}_thickness.raw"));
        raw::write(thicknesses.iter().map(|t| t[m] as f32), &path)?;
        let path = PathBuf::from(format!("{out}_{name}_precision.raw"));
        raw::write(precisions.iter().map(|p| p[m] as f32), &path)?;
        info!("wrote {}", path.display());
    }
    Ok(())
}
