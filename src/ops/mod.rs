pub mod inpaint;
